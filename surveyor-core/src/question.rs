//! Question definitions
//!
//! A question is immutable once its survey has been built. The question type
//! decides how options are presented, which answering instructions are used
//! by default, and how a provider's answer text is validated.

use crate::agent::Agent;
use crate::error::{Result, SurveyError};
use crate::scenario::Scenario;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Names that would collide with template namespaces
const RESERVED_NAMES: &[&str] =
    &["scenario", "agent", "and", "or", "not", "in", "true", "false", "null"];

/// Computes a functional question's answer without calling a model
pub type FunctionalFn =
    Arc<dyn Fn(&Scenario, &Agent) -> std::result::Result<Value, String> + Send + Sync>;

/// Question type together with its type-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuestionKind {
    FreeText,
    MultipleChoice {
        options: Vec<Value>,
    },
    Checkbox {
        options: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_selections: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_selections: Option<usize>,
    },
    Numeric {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<f64>,
    },
    LinearScale {
        options: Vec<i64>,
        /// Labels keyed by the option's decimal string, e.g. `"1": "Hate it"`
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        option_labels: BTreeMap<String, String>,
    },
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_list_items: Option<usize>,
    },
    Budget {
        options: Vec<Value>,
        budget_sum: f64,
    },
    Rank {
        options: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_selections: Option<usize>,
    },
    Extract {
        answer_template: BTreeMap<String, Value>,
    },
    Functional,
}

impl QuestionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FreeText => "free_text",
            Self::MultipleChoice { .. } => "multiple_choice",
            Self::Checkbox { .. } => "checkbox",
            Self::Numeric { .. } => "numeric",
            Self::LinearScale { .. } => "linear_scale",
            Self::List { .. } => "list",
            Self::Budget { .. } => "budget",
            Self::Rank { .. } => "rank",
            Self::Extract { .. } => "extract",
            Self::Functional => "functional",
        }
    }

    /// Option list for the choice-style types
    pub fn options(&self) -> &[Value] {
        match self {
            Self::MultipleChoice { options }
            | Self::Checkbox { options, .. }
            | Self::Budget { options, .. }
            | Self::Rank { options, .. } => options,
            _ => &[],
        }
    }

    /// Free-text and functional questions never carry a comment
    pub fn has_comment(&self) -> bool {
        !matches!(self, Self::FreeText | Self::Functional)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
    /// Overrides the type's default answering instructions. Template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Skip this question when the expression evaluates true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_if: Option<String>,
    /// Prior questions whose text and answer are embedded in this prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory: Vec<String>,
    #[serde(skip)]
    pub function: Option<FunctionalFn>,
}

impl fmt::Debug for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Question")
            .field("name", &self.name)
            .field("text", &self.text)
            .field("kind", &self.kind)
            .field("instructions", &self.instructions)
            .field("skip_if", &self.skip_if)
            .field("memory", &self.memory)
            .field("function", &self.function.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Question {
    pub fn new(name: impl Into<String>, text: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            kind,
            instructions: None,
            skip_if: None,
            memory: vec![],
            function: None,
        }
    }

    pub fn free_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, QuestionKind::FreeText)
    }

    pub fn multiple_choice<I, V>(
        name: impl Into<String>,
        text: impl Into<String>,
        options: I,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(name, text, QuestionKind::MultipleChoice { options: collect_options(options) })
    }

    pub fn checkbox<I, V>(name: impl Into<String>, text: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let options = collect_options(options);
        let kind = QuestionKind::Checkbox { options, min_selections: None, max_selections: None };
        Self::new(name, text, kind)
    }

    pub fn numeric(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, QuestionKind::Numeric { min_value: None, max_value: None })
    }

    pub fn linear_scale(
        name: impl Into<String>,
        text: impl Into<String>,
        options: Vec<i64>,
    ) -> Self {
        let kind = QuestionKind::LinearScale { options, option_labels: BTreeMap::new() };
        Self::new(name, text, kind)
    }

    pub fn list(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text, QuestionKind::List { max_list_items: None })
    }

    pub fn budget<I, V>(
        name: impl Into<String>,
        text: impl Into<String>,
        options: I,
        budget_sum: f64,
    ) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let kind = QuestionKind::Budget { options: collect_options(options), budget_sum };
        Self::new(name, text, kind)
    }

    pub fn rank<I, V>(name: impl Into<String>, text: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let kind = QuestionKind::Rank { options: collect_options(options), num_selections: None };
        Self::new(name, text, kind)
    }

    pub fn extract(
        name: impl Into<String>,
        text: impl Into<String>,
        answer_template: BTreeMap<String, Value>,
    ) -> Self {
        Self::new(name, text, QuestionKind::Extract { answer_template })
    }

    pub fn functional<F>(name: impl Into<String>, text: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Scenario, &Agent) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let mut question = Self::new(name, text, QuestionKind::Functional);
        question.function = Some(Arc::new(function));
        question
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_skip_if(mut self, expression: impl Into<String>) -> Self {
        self.skip_if = Some(expression.into());
        self
    }

    pub fn with_memory<I, S>(mut self, questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.memory.extend(questions.into_iter().map(Into::into));
        self
    }

    /// Bounds for numeric questions, selection counts for checkbox questions
    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        match &mut self.kind {
            QuestionKind::Numeric { min_value, max_value } => {
                *min_value = min;
                *max_value = max;
            }
            QuestionKind::Checkbox { min_selections, max_selections, .. } => {
                *min_selections = min.map(|v| v as usize);
                *max_selections = max.map(|v| v as usize);
            }
            _ => {}
        }
        self
    }

    /// Every template string attached to this question
    pub fn templates(&self) -> Vec<&str> {
        let mut templates = vec![self.text.as_str()];
        if let Some(instructions) = &self.instructions {
            templates.push(instructions);
        }
        templates.extend(self.kind.options().iter().filter_map(|o| o.as_str()));
        templates
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| SurveyError::InvalidQuestion {
            name: self.name.clone(),
            message: message.to_string(),
        };

        if !is_identifier(&self.name) {
            return Err(invalid("name must be a valid identifier"));
        }
        if RESERVED_NAMES.contains(&self.name.as_str()) {
            return Err(invalid("name is reserved"));
        }
        if self.text.trim().is_empty() {
            return Err(invalid("question text is empty"));
        }

        match &self.kind {
            QuestionKind::MultipleChoice { options } => {
                check_options(options).map_err(|m| invalid(&m))?
            }
            QuestionKind::Checkbox { options, min_selections, max_selections } => {
                check_options(options).map_err(|m| invalid(&m))?;
                if let (Some(min), Some(max)) = (min_selections, max_selections) {
                    if min > max {
                        return Err(invalid("min_selections exceeds max_selections"));
                    }
                }
                if max_selections.is_some_and(|max| max > options.len()) {
                    return Err(invalid("max_selections exceeds the number of options"));
                }
            }
            QuestionKind::Numeric { min_value: Some(min), max_value: Some(max) } if min > max => {
                return Err(invalid("min_value exceeds max_value"));
            }
            QuestionKind::LinearScale { options, .. } => {
                if options.is_empty() {
                    return Err(invalid("linear scale needs at least one option"));
                }
                let unique: HashSet<_> = options.iter().collect();
                if unique.len() != options.len() {
                    return Err(invalid("duplicate scale option"));
                }
            }
            QuestionKind::Budget { options, budget_sum } => {
                check_options(options).map_err(|m| invalid(&m))?;
                if *budget_sum <= 0.0 {
                    return Err(invalid("budget_sum must be positive"));
                }
            }
            QuestionKind::Rank { options, num_selections } => {
                check_options(options).map_err(|m| invalid(&m))?;
                if num_selections.is_some_and(|n| n == 0 || n > options.len()) {
                    return Err(invalid(
                        "num_selections must be between 1 and the number of options",
                    ));
                }
            }
            QuestionKind::Extract { answer_template } if answer_template.is_empty() => {
                return Err(invalid("answer_template is empty"));
            }
            QuestionKind::Functional if self.function.is_none() => {
                return Err(invalid("functional question has no function"));
            }
            _ => {}
        }

        Ok(())
    }
}

fn collect_options<I, V>(options: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    options.into_iter().map(Into::into).collect()
}

fn check_options(options: &[Value]) -> std::result::Result<(), String> {
    if options.is_empty() {
        return Err("at least one option is required".to_string());
    }
    let mut seen = HashSet::new();
    for option in options {
        if !seen.insert(crate::value::render_value(option)) {
            return Err(format!("duplicate option: {}", option));
        }
    }
    Ok(())
}

/// Letters, digits and underscores, not starting with a digit
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
