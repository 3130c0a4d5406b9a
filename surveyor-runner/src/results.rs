//! Column-oriented result set
//!
//! One row per interview, in interview index order. Column names are the
//! stable union across every interview of the run:
//!
//! - `interview.index`, `interview.iteration`, `interview.complete`
//! - `agent.agent_index`, `agent.agent_name`, `agent.<trait>`
//! - `scenario.scenario_index`, `scenario.<key>`
//! - `model.model_index`, `model.provider`, `model.model`, `model.<parameter>`
//! - per question: `answer.<q>`, `comment.<q>` (not for free text or
//!   functional questions), `prompt.<q>_system_prompt`,
//!   `prompt.<q>_user_prompt`, `raw_model_response.<q>_raw_model_response`,
//!   `usage.<q>_input_tokens`, `usage.<q>_output_tokens`, `usage.<q>_cost`,
//!   `cache_used.<q>`, `task_status.<q>`, `error.<q>`

use crate::job::Interview;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use surveyor_core::{AnswerContext, AnswerRecord, Survey, TaskStatus};

/// An interview's final state, ready to be folded into a row
#[derive(Debug, Clone)]
pub struct InterviewRecord {
    pub interview: Interview,
    pub context: AnswerContext,
    /// Every task reached a terminal status
    pub complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Results {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    index: HashMap<String, usize>,
    len: usize,
}

/// Borrowed view of one row
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    results: &'a Results,
    index: usize,
}

impl<'a> Row<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.results.column(column).map(|values| &values[self.index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let results = self.results;
        let index = self.index;
        results
            .columns
            .iter()
            .zip(&results.data)
            .map(move |(name, values)| (name.as_str(), &values[index]))
    }

    /// Row as a JSON array, in column order
    pub fn to_values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl Results {
    /// Fold interview records into rows. `records` must be in interview
    /// index order.
    pub fn assemble(survey: &Survey, records: &[InterviewRecord]) -> Self {
        let mut columns: Vec<String> =
            ["interview.index", "interview.iteration", "interview.complete"]
                .map(String::from)
                .to_vec();

        let interviews = || records.iter().map(|r| &r.interview);
        let trait_keys = union(interviews().flat_map(|i| i.agent.traits.keys().cloned()));
        let scenario_keys = union(interviews().flat_map(|i| i.scenario.keys().cloned()));
        let parameter_keys =
            union(interviews().flat_map(|i| i.model.parameters.to_map().into_keys()));

        columns.extend(["agent.agent_index", "agent.agent_name"].map(String::from));
        columns.extend(trait_keys.iter().map(|k| format!("agent.{}", k)));
        columns.push("scenario.scenario_index".into());
        columns.extend(scenario_keys.iter().map(|k| format!("scenario.{}", k)));
        columns.extend(["model.model_index", "model.provider", "model.model"].map(String::from));
        columns.extend(parameter_keys.iter().map(|k| format!("model.{}", k)));

        let questions = survey.questions();
        let commented: Vec<&str> =
            questions.iter().filter(|q| q.kind.has_comment()).map(|q| q.name.as_str()).collect();
        columns.extend(questions.iter().map(|q| format!("answer.{}", q.name)));
        columns.extend(commented.iter().map(|q| format!("comment.{}", q)));
        for q in questions {
            columns.push(format!("prompt.{}_system_prompt", q.name));
            columns.push(format!("prompt.{}_user_prompt", q.name));
        }
        columns.extend(
            questions.iter().map(|q| format!("raw_model_response.{}_raw_model_response", q.name)),
        );
        for q in questions {
            columns.push(format!("usage.{}_input_tokens", q.name));
            columns.push(format!("usage.{}_output_tokens", q.name));
            columns.push(format!("usage.{}_cost", q.name));
        }
        columns.extend(questions.iter().map(|q| format!("cache_used.{}", q.name)));
        columns.extend(questions.iter().map(|q| format!("task_status.{}", q.name)));
        columns.extend(questions.iter().map(|q| format!("error.{}", q.name)));

        let mut data = vec![Vec::with_capacity(records.len()); columns.len()];
        for record in records {
            let row =
                build_row(record, survey, &commented, &trait_keys, &scenario_keys, &parameter_keys);
            debug_assert_eq!(row.len(), columns.len());
            for (column, value) in data.iter_mut().zip(row) {
                column.push(value);
            }
        }

        Self::from_parts(columns, data, records.len())
    }

    fn from_parts(columns: Vec<String>, data: Vec<Vec<Value>>, len: usize) -> Self {
        let index = columns.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();
        Self { columns, data, index, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.index.get(name).map(|&i| self.data[i].as_slice())
    }

    /// Answers to one question, one per row
    pub fn answers(&self, question: &str) -> Option<&[Value]> {
        self.column(&format!("answer.{}", question))
    }

    pub fn row(&self, index: usize) -> Option<Row<'_>> {
        (index < self.len).then_some(Row { results: self, index })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.len).map(move |index| Row { results: self, index })
    }

    /// Keep columns named by `prefixes`: either an exact column name or a
    /// group such as `answer` or `scenario`
    pub fn select(&self, prefixes: &[&str]) -> Results {
        let keep: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| {
                prefixes.iter().any(|&p| {
                    name.as_str() == p
                        || name.strip_prefix(p).is_some_and(|rest| rest.starts_with('.'))
                })
            })
            .map(|(i, _)| i)
            .collect();
        let columns = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let data = keep.iter().map(|&i| self.data[i].clone()).collect();
        Self::from_parts(columns, data, self.len)
    }

    /// Keep rows for which `predicate` holds
    pub fn filter(&self, predicate: impl Fn(&Row<'_>) -> bool) -> Results {
        let keep: Vec<usize> =
            self.rows().filter(|row| predicate(row)).map(|row| row.index).collect();
        let data = self
            .data
            .iter()
            .map(|values| keep.iter().map(|&i| values[i].clone()).collect())
            .collect();
        Self::from_parts(self.columns.clone(), data, keep.len())
    }

    /// `{"columns": [...], "rows": [[...], ...]}`
    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self.rows().map(|row| Value::Array(row.to_values())).collect();
        json!({ "columns": self.columns, "rows": rows })
    }
}

impl Serialize for Results {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn union(keys: impl Iterator<Item = String>) -> Vec<String> {
    keys.collect::<BTreeSet<_>>().into_iter().collect()
}

fn build_row(
    record: &InterviewRecord,
    survey: &Survey,
    commented: &[&str],
    trait_keys: &[String],
    scenario_keys: &[String],
    parameter_keys: &[String],
) -> Vec<Value> {
    let interview = &record.interview;
    let mut row = vec![json!(interview.index), json!(interview.iteration), json!(record.complete)];

    row.push(json!(interview.agent_index));
    row.push(json!(interview.agent_name()));
    row.extend(
        trait_keys.iter().map(|k| interview.agent.traits.get(k).cloned().unwrap_or(Value::Null)),
    );
    row.push(json!(interview.scenario_index));
    row.extend(
        scenario_keys.iter().map(|k| interview.scenario.get(k).cloned().unwrap_or(Value::Null)),
    );
    row.push(json!(interview.model_index));
    row.push(json!(interview.model.provider));
    row.push(json!(interview.model.name));
    let parameters = interview.model.parameters.to_map();
    row.extend(parameter_keys.iter().map(|k| parameters.get(k).cloned().unwrap_or(Value::Null)));

    let questions = survey.questions();
    let records: Vec<Option<&AnswerRecord>> =
        questions.iter().map(|q| record.context.get(&q.name)).collect();

    row.extend(
        questions.iter().map(|q| record.context.answer(&q.name).cloned().unwrap_or(Value::Null)),
    );
    row.extend(
        commented.iter().map(|q| record.context.comment(q).map_or(Value::Null, |c| json!(c))),
    );
    for r in &records {
        let prompt = r.and_then(|r| r.prompt.as_ref());
        row.push(prompt.map_or(Value::Null, |p| json!(p.system_prompt)));
        row.push(prompt.map_or(Value::Null, |p| json!(p.user_prompt)));
    }
    row.extend(records.iter().map(|r| r.map_or(Value::Null, |r| r.raw_response.clone())));
    for r in &records {
        match r {
            Some(r) if r.prompt.is_some() => {
                row.push(json!(r.usage.input_tokens));
                row.push(json!(r.usage.output_tokens));
                row.push(json!(r.usage.cost));
            }
            _ => row.extend([Value::Null, Value::Null, Value::Null]),
        }
    }
    row.extend(records.iter().map(|r| json!(r.is_some_and(|r| r.cached))));
    row.extend(records.iter().map(|r| json!(r.map_or(TaskStatus::Pending, |r| r.status).as_str())));
    row.extend(records.iter().map(|r| {
        r.and_then(|r| r.error.as_ref())
            .map_or(Value::Null, |e| json!(format!("{}: {}", e.kind, e.message)))
    }));
    row
}
