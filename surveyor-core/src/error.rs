//! Error types for survey construction and task execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for survey construction
pub type Result<T> = std::result::Result<T, SurveyError>;

/// Errors raised while building a survey. These never occur at run time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurveyError {
    #[error("Survey has no questions")]
    EmptySurvey,

    #[error("Duplicate question name: {0}")]
    DuplicateQuestion(String),

    #[error("Question '{question}' references unknown question '{reference}'")]
    UnknownQuestion { question: String, reference: String },

    #[error("Rule targets unknown question: {0}")]
    UnknownRuleTarget(String),

    #[error("Question '{question}' references '{reference}', which comes later in the survey")]
    ForwardReference { question: String, reference: String },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Invalid expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("Invalid question '{name}': {message}")]
    InvalidQuestion { name: String, message: String },
}

/// Stable label for a task failure, used in result columns and exception reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TemplateRender,
    ProviderTransient,
    ProviderFatal,
    Validation,
    Cache,
    DirectAnswer,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateRender => "template_render",
            Self::ProviderTransient => "provider_transient",
            Self::ProviderFatal => "provider_fatal",
            Self::Validation => "validation",
            Self::Cache => "cache",
            Self::DirectAnswer => "direct_answer",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors recorded against a single task. A task error never aborts sibling
/// tasks or other interviews.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("Template render error: {0}")]
    TemplateRender(String),

    #[error("Transient provider error: {0}")]
    ProviderTransient(String),

    #[error("Fatal provider error: {0}")]
    ProviderFatal(String),

    #[error("Answer validation error: {0}")]
    Validation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Direct answer error: {0}")]
    DirectAnswer(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TemplateRender(_) => ErrorKind::TemplateRender,
            Self::ProviderTransient(_) => ErrorKind::ProviderTransient,
            Self::ProviderFatal(_) => ErrorKind::ProviderFatal,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cache(_) => ErrorKind::Cache,
            Self::DirectAnswer(_) => ErrorKind::DirectAnswer,
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            Self::TemplateRender(m)
            | Self::ProviderTransient(m)
            | Self::ProviderFatal(m)
            | Self::Validation(m)
            | Self::Cache(m)
            | Self::DirectAnswer(m) => m,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderTransient(_))
    }
}
