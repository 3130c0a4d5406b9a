//! Simulated respondents

use crate::context::AnswerContext;
use crate::question::Question;
use crate::scenario::Scenario;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Per-question trait overrides, composed with an agent's base traits at
/// render time. The agent itself is never mutated.
pub trait TraitProvider: Send + Sync {
    fn traits_for(&self, question: &Question) -> BTreeMap<String, Value>;
}

impl<F> TraitProvider for F
where
    F: Fn(&Question) -> BTreeMap<String, Value> + Send + Sync,
{
    fn traits_for(&self, question: &Question) -> BTreeMap<String, Value> {
        self(question)
    }
}

/// Answers a question without any model call. The returned value is
/// recorded as the task's answer.
pub trait DirectAnswer: Send + Sync {
    fn answer(
        &self,
        question: &Question,
        scenario: &Scenario,
        context: &AnswerContext,
    ) -> Result<Value, String>;
}

impl<F> DirectAnswer for F
where
    F: Fn(&Question, &Scenario, &AnswerContext) -> Result<Value, String> + Send + Sync,
{
    fn answer(
        &self,
        question: &Question,
        scenario: &Scenario,
        context: &AnswerContext,
    ) -> Result<Value, String> {
        self(question, scenario, context)
    }
}

/// Where an agent's answers come from
#[derive(Clone, Default)]
pub enum AnswerSource {
    #[default]
    Model,
    Direct(Arc<dyn DirectAnswer>),
}

impl fmt::Debug for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Model => f.write_str("Model"),
            Self::Direct(_) => f.write_str("Direct(<fn>)"),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Agent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub traits: BTreeMap<String, Value>,
    /// Replaces the default persona framing. Template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(skip)]
    pub trait_provider: Option<Arc<dyn TraitProvider>>,
    #[serde(skip)]
    pub answer_source: AnswerSource,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("traits", &self.traits)
            .field("instruction", &self.instruction)
            .field("trait_provider", &self.trait_provider.as_ref().map(|_| "<fn>"))
            .field("answer_source", &self.answer_source)
            .finish()
    }
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn with_trait(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.traits.insert(key.into(), value.into());
        self
    }

    pub fn with_traits(mut self, traits: BTreeMap<String, Value>) -> Self {
        self.traits.extend(traits);
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn with_trait_provider(mut self, provider: impl TraitProvider + 'static) -> Self {
        self.trait_provider = Some(Arc::new(provider));
        self
    }

    pub fn with_direct_answer(mut self, answerer: impl DirectAnswer + 'static) -> Self {
        self.answer_source = AnswerSource::Direct(Arc::new(answerer));
        self
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.answer_source, AnswerSource::Direct(_))
    }

    /// Base traits overlaid with the trait provider's overrides for `question`
    pub fn effective_traits(&self, question: &Question) -> BTreeMap<String, Value> {
        let mut traits = self.traits.clone();
        if let Some(provider) = &self.trait_provider {
            traits.extend(provider.traits_for(question));
        }
        traits
    }

    /// Label used in logs and result columns
    pub fn display_name(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("agent_{}", index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effective_traits_do_not_mutate_agent() {
        let agent = Agent::named("ada")
            .with_trait("age", 36)
            .with_trait("mood", "calm")
            .with_trait_provider(|q: &Question| {
                let mut overrides = BTreeMap::new();
                if q.name == "stress" {
                    overrides.insert("mood".to_string(), json!("anxious"));
                }
                overrides
            });

        let stressed = agent.effective_traits(&Question::free_text("stress", "How do you feel?"));
        assert_eq!(stressed["mood"], json!("anxious"));
        assert_eq!(stressed["age"], json!(36));

        let other = agent.effective_traits(&Question::free_text("other", "Hi"));
        assert_eq!(other["mood"], json!("calm"));
        assert_eq!(agent.traits["mood"], json!("calm"));
    }

    #[test]
    fn test_direct_answer_source() {
        let agent = Agent::new().with_direct_answer(
            |_q: &Question, _s: &Scenario, _c: &AnswerContext| Ok(json!("yes")),
        );
        assert!(agent.is_direct());
        assert!(!Agent::new().is_direct());
    }

    #[test]
    fn test_agent_deserializes_without_strategies() {
        let agent: Agent =
            serde_json::from_value(json!({"name": "bob", "traits": {"age": 40}})).unwrap();
        assert_eq!(agent.name.as_deref(), Some("bob"));
        assert!(agent.trait_provider.is_none());
        assert_eq!(agent.display_name(3), "bob");
        assert_eq!(Agent::new().display_name(3), "agent_3");
    }
}
