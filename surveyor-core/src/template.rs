//! `{{ ... }}` placeholder rendering for question text, options and instructions
//!
//! Supported placeholders:
//! - `{{ key }}` / `{{ scenario.key.path }}` - scenario value
//! - `{{ agent.trait }}` - the agent's effective trait for this question
//! - `{{ q.answer }}`, `{{ q.answer.path }}` - a prior question's answer
//! - `{{ q.comment }}`, `{{ q.question_text }}` - a prior question's comment or rendered text
//!
//! A trailing `?` (`{{ key? }}`) makes the placeholder optional: it renders as
//! an empty string when the value is missing. Anything that is not a valid
//! reference is left in the output unchanged.

use crate::context::{AnswerContext, TaskStatus};
use crate::error::TaskError;
use crate::question::is_identifier;
use crate::scenario::Scenario;
use crate::value::{lookup_path, render_value};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("Invalid regex pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Scenario { path: Vec<String> },
    Agent { path: Vec<String> },
    Answer { question: String, path: Vec<String> },
    Comment { question: String },
    QuestionText { question: String },
}

impl Placeholder {
    /// The prior question this placeholder pipes from, if any
    pub fn piped_question(&self) -> Option<&str> {
        match self {
            Self::Answer { question, .. }
            | Self::Comment { question }
            | Self::QuestionText { question } => Some(question),
            _ => None,
        }
    }

    /// Parse placeholder content such as `q1.answer` or `city?`.
    /// Returns `None` when the content is not a reference.
    pub fn parse(content: &str) -> Option<(Self, bool)> {
        let content = content.trim();
        let (content, optional) = match content.strip_suffix('?') {
            Some(name) => (name.trim_end(), true),
            None => (content, false),
        };

        let segments: Vec<&str> = content.split('.').collect();
        let (first, rest) = segments.split_first()?;
        if !is_identifier(first) || !rest.iter().all(|s| is_identifier(s) || is_index(s)) {
            return None;
        }
        let owned = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let placeholder = match (*first, rest) {
            ("scenario", []) | ("agent", []) => return None,
            ("scenario", path) => Self::Scenario { path: owned(path) },
            ("agent", path) => Self::Agent { path: owned(path) },
            (question, ["answer", path @ ..]) => {
                Self::Answer { question: question.to_string(), path: owned(path) }
            }
            (question, ["comment"]) => Self::Comment { question: question.to_string() },
            (question, ["question_text"]) => Self::QuestionText { question: question.to_string() },
            _ => Self::Scenario { path: owned(&segments) },
        };
        Some((placeholder, optional))
    }
}

fn is_index(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Inputs available while rendering one task
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub scenario: &'a Scenario,
    pub traits: &'a BTreeMap<String, Value>,
    pub answers: &'a AnswerContext,
}

/// All references in a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<(Placeholder, bool)> {
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).and_then(|m| Placeholder::parse(m.as_str())))
        .collect()
}

/// Names of prior questions a template pipes from
pub fn piped_questions(template: &str) -> BTreeSet<String> {
    placeholders(template)
        .iter()
        .filter_map(|(p, _)| p.piped_question().map(str::to_string))
        .collect()
}

/// Render a template. Pure: identical inputs always yield identical output.
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> Result<String, TaskError> {
    let regex = placeholder_regex();
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for caps in regex.captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        result.push_str(&template[last_end..whole.start()]);

        match Placeholder::parse(inner.as_str()) {
            Some((placeholder, optional)) => match resolve(&placeholder, ctx) {
                Ok(text) => result.push_str(&text),
                Err(_) if optional => {}
                Err(message) => return Err(TaskError::TemplateRender(message)),
            },
            None => result.push_str(whole.as_str()),
        }

        last_end = whole.end();
    }

    result.push_str(&template[last_end..]);
    Ok(result)
}

fn resolve(placeholder: &Placeholder, ctx: &TemplateContext<'_>) -> Result<String, String> {
    match placeholder {
        Placeholder::Scenario { path } => ctx
            .scenario
            .get_path(path)
            .map(render_value)
            .ok_or_else(|| format!("scenario key '{}' not found", path.join("."))),
        Placeholder::Agent { path } => {
            let (first, rest) =
                path.split_first().ok_or_else(|| "empty agent reference".to_string())?;
            ctx.traits
                .get(first)
                .and_then(|v| lookup_path(v, rest))
                .map(render_value)
                .ok_or_else(|| format!("agent trait '{}' not found", path.join(".")))
        }
        Placeholder::Answer { question, path } => {
            let answer = succeeded_record(question, ctx.answers)?;
            lookup_path(&answer.answer, path)
                .map(render_value)
                .ok_or_else(|| {
                    format!("answer to '{}' has no field '{}'", question, path.join("."))
                })
        }
        Placeholder::Comment { question } => {
            Ok(succeeded_record(question, ctx.answers)?.comment.clone().unwrap_or_default())
        }
        Placeholder::QuestionText { question } => ctx
            .answers
            .get(question)
            .and_then(|r| r.question_text.clone())
            .ok_or_else(|| format!("question text of '{}' is unavailable", question)),
    }
}

fn succeeded_record<'a>(
    question: &str,
    answers: &'a AnswerContext,
) -> Result<&'a crate::context::AnswerRecord, String> {
    match answers.get(question) {
        Some(record) if record.status == TaskStatus::Succeeded => Ok(record),
        Some(record) if record.status.is_terminal() => {
            Err(format!("answer to '{}' is unavailable ({})", question, record.status.as_str()))
        }
        _ => Err(format!("answer to '{}' is not yet available", question)),
    }
}
