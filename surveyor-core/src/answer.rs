//! Parsing and validation of provider answer text

use crate::error::TaskError;
use crate::question::QuestionKind;
use crate::value::{as_number, number_value, render_value};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

const BUDGET_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    pub answer: Value,
    pub comment: Option<String>,
}

fn invalid(message: impl Into<String>) -> TaskError {
    TaskError::Validation(message.into())
}

/// Parse `text` into an answer for a question of `kind`.
///
/// `options` are the question's rendered options; for non-choice types the
/// slice is ignored. Accepted shapes are a JSON object
/// `{"answer": ..., "comment": ...}`, a leading JSON list or object followed
/// by a free-text comment, or a first line holding the answer with the
/// remaining lines as comment. Free-text answers never carry a comment.
pub fn parse_answer(
    kind: &QuestionKind,
    options: &[Value],
    text: &str,
) -> Result<ParsedAnswer, TaskError> {
    let text = strip_code_fence(text.trim());

    if matches!(kind, QuestionKind::FreeText) {
        if text.is_empty() {
            return Err(invalid("empty answer"));
        }
        return Ok(ParsedAnswer { answer: Value::String(text.to_string()), comment: None });
    }
    if matches!(kind, QuestionKind::Functional) {
        return Err(invalid("functional questions have no model answer"));
    }

    let (raw, comment) = split_answer(text);
    let answer = normalize(kind, options, raw)?;
    Ok(ParsedAnswer { answer, comment })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.trim_start_matches(|c: char| c.is_alphanumeric());
    match inner.rfind("```") {
        Some(end) => inner[..end].trim(),
        None => inner.trim(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn split_answer(text: &str) -> (Value, Option<String>) {
    if text.starts_with('{') || text.starts_with('[') {
        let mut stream = serde_json::Deserializer::from_str(text).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next() {
            let rest = non_empty(&text[stream.byte_offset()..]);
            return match value {
                Value::Object(mut map) if map.contains_key("answer") => {
                    let answer = map.remove("answer").unwrap_or(Value::Null);
                    let comment = match map.remove("comment") {
                        Some(Value::String(c)) => non_empty(&c),
                        Some(Value::Null) | None => rest,
                        Some(other) => Some(other.to_string()),
                    };
                    (answer, comment)
                }
                value => (value, rest),
            };
        }
    }

    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    (Value::String(first.trim().to_string()), non_empty(rest))
}

/// Trim whitespace, surrounding quotes and a trailing period
fn clean(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'').trim().trim_end_matches('.').trim()
}

fn match_option(options: &[Value], candidate: &Value) -> Result<Value, TaskError> {
    let text = render_value(candidate);
    let wanted = clean(&text);
    options
        .iter()
        .find(|o| {
            render_value(o).eq_ignore_ascii_case(wanted) || (!o.is_string() && o == &candidate)
        })
        .cloned()
        .ok_or_else(|| invalid(format!("'{}' is not one of the options", wanted)))
}

/// List view of a raw answer: a JSON array, or comma-separated text
fn as_items(raw: Value) -> Vec<Value> {
    match raw {
        Value::Array(items) => items,
        Value::String(s) => {
            let s = s.trim();
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
                return items;
            }
            let s = s.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(s);
            s.split(',')
                .map(clean)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect()
        }
        Value::Null => vec![],
        other => vec![other],
    }
}

fn match_unique(options: &[Value], items: Vec<Value>) -> Result<Vec<Value>, TaskError> {
    let mut seen = HashSet::new();
    let mut matched = Vec::with_capacity(items.len());
    for item in items {
        let option = match_option(options, &item)?;
        if !seen.insert(render_value(&option)) {
            return Err(invalid(format!(
                "option '{}' selected more than once",
                render_value(&option)
            )));
        }
        matched.push(option);
    }
    Ok(matched)
}

fn parse_number(raw: &Value) -> Result<f64, TaskError> {
    match raw {
        Value::String(s) => {
            let cleaned: String =
                clean(s).chars().filter(|c| !matches!(c, ',' | '$' | ' ')).collect();
            cleaned.parse::<f64>().map_err(|_| invalid(format!("'{}' is not a number", s.trim())))
        }
        other => as_number(other).ok_or_else(|| invalid(format!("'{}' is not a number", other))),
    }
}

fn normalize(kind: &QuestionKind, options: &[Value], raw: Value) -> Result<Value, TaskError> {
    match kind {
        QuestionKind::MultipleChoice { .. } => match_option(options, &raw),

        QuestionKind::Checkbox { min_selections, max_selections, .. } => {
            let selected = match_unique(options, as_items(raw))?;
            if let Some(min) = min_selections.filter(|&min| selected.len() < min) {
                return Err(invalid(format!("expected at least {} selections", min)));
            }
            if let Some(max) = max_selections.filter(|&max| selected.len() > max) {
                return Err(invalid(format!("expected at most {} selections", max)));
            }
            Ok(Value::Array(selected))
        }

        QuestionKind::Numeric { min_value, max_value } => {
            let n = parse_number(&raw)?;
            if min_value.is_some_and(|min| n < min) || max_value.is_some_and(|max| n > max) {
                return Err(invalid(format!("{} is out of range", n)));
            }
            Ok(number_value(n))
        }

        QuestionKind::LinearScale { options: scale, .. } => {
            let text = render_value(&raw);
            let head = text.split(':').next().unwrap_or_default();
            let n = parse_number(&Value::String(head.to_string()))?;
            scale
                .iter()
                .find(|&&o| o as f64 == n)
                .map(|&o| Value::from(o))
                .ok_or_else(|| invalid(format!("{} is not on the scale", n)))
        }

        QuestionKind::List { max_list_items } => {
            let items = as_items(raw);
            if max_list_items.is_some_and(|max| items.len() > max) {
                return Err(invalid(format!("list has {} items, more than allowed", items.len())));
            }
            Ok(Value::Array(items))
        }

        QuestionKind::Budget { budget_sum, .. } => {
            let allocation = match raw {
                Value::Object(map) => map,
                Value::Array(items) if items.len() == options.len() => {
                    options.iter().map(render_value).zip(items).collect::<Map<String, Value>>()
                }
                other => {
                    return Err(invalid(format!("expected an allocation object, got {}", other)));
                }
            };

            let mut out = Map::new();
            for option in options {
                out.insert(render_value(option), Value::from(0));
            }
            let mut total = 0.0;
            for (key, amount) in allocation {
                let option = match_option(options, &Value::String(key))?;
                let amount = parse_number(&amount)?;
                if amount < 0.0 {
                    return Err(invalid("allocations must not be negative"));
                }
                total += amount;
                out.insert(render_value(&option), number_value(amount));
            }
            if (total - budget_sum).abs() > BUDGET_TOLERANCE * budget_sum.max(1.0) {
                return Err(invalid(format!(
                    "allocations sum to {}, expected {}",
                    total, budget_sum
                )));
            }
            Ok(Value::Object(out))
        }

        QuestionKind::Rank { num_selections, .. } => {
            let ranked = match_unique(options, as_items(raw))?;
            let expected = num_selections.unwrap_or(options.len());
            if ranked.len() != expected {
                return Err(invalid(format!(
                    "expected {} ranked options, got {}",
                    expected,
                    ranked.len()
                )));
            }
            Ok(Value::Array(ranked))
        }

        QuestionKind::Extract { answer_template } => {
            let Value::Object(mut map) = raw else {
                return Err(invalid("expected a JSON object"));
            };
            if let Some(unknown) = map.keys().find(|k| !answer_template.contains_key(*k)) {
                return Err(invalid(format!("unexpected key '{}'", unknown)));
            }
            for key in answer_template.keys() {
                map.entry(key.clone()).or_insert(Value::Null);
            }
            Ok(Value::Object(map))
        }

        QuestionKind::FreeText | QuestionKind::Functional => Ok(raw),
    }
}
