//! Per-interview answer context

use crate::error::{ErrorKind, TaskError};
use crate::model::Usage;
use crate::prompt::RenderedPrompt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Rendering,
    Dispatched,
    Retrying,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    /// A terminal status unblocks every successor
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rendering => "rendering",
            Self::Dispatched => "dispatched",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TaskError> for TaskFailure {
    fn from(err: &TaskError) -> Self {
        Self { kind: err.kind(), message: err.message().to_string() }
    }
}

/// Everything recorded for one question within one interview
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub status: TaskStatus,
    pub answer: Value,
    pub comment: Option<String>,
    /// Rendered question text, used by memory blocks and `q.question_text`
    pub question_text: Option<String>,
    pub prompt: Option<RenderedPrompt>,
    pub raw_response: Value,
    pub usage: Usage,
    pub cached: bool,
    pub attempts: u32,
    pub error: Option<TaskFailure>,
}

impl AnswerRecord {
    pub fn succeeded(answer: Value, comment: Option<String>) -> Self {
        Self { status: TaskStatus::Succeeded, answer, comment, ..Self::default() }
    }

    pub fn skipped() -> Self {
        Self { status: TaskStatus::Skipped, ..Self::default() }
    }

    pub fn failed(error: &TaskError) -> Self {
        Self { status: TaskStatus::Failed, error: Some(error.into()), ..Self::default() }
    }

    pub fn with_prompt(mut self, prompt: RenderedPrompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_question_text(mut self, text: impl Into<String>) -> Self {
        self.question_text = Some(text.into());
        self
    }
}

/// Question name to record. Owned by exactly one interview driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerContext {
    records: BTreeMap<String, AnswerRecord>,
}

impl AnswerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question: &str) -> Option<&AnswerRecord> {
        self.records.get(question)
    }

    pub fn record(&mut self, question: impl Into<String>, record: AnswerRecord) {
        self.records.insert(question.into(), record);
    }

    /// Move a question to a non-terminal status, creating its record if needed
    pub fn set_status(&mut self, question: &str, status: TaskStatus) {
        self.records.entry(question.to_string()).or_default().status = status;
    }

    pub fn status(&self, question: &str) -> TaskStatus {
        self.records.get(question).map(|r| r.status).unwrap_or_default()
    }

    pub fn is_terminal(&self, question: &str) -> bool {
        self.status(question).is_terminal()
    }

    /// Answer of a succeeded question
    pub fn answer(&self, question: &str) -> Option<&Value> {
        self.records.get(question).filter(|r| r.status == TaskStatus::Succeeded).map(|r| &r.answer)
    }

    pub fn comment(&self, question: &str) -> Option<&str> {
        self.records
            .get(question)
            .filter(|r| r.status == TaskStatus::Succeeded)
            .and_then(|r| r.comment.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AnswerRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
