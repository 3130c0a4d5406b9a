use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Call parameters for a model. Compared by value; part of the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Provider-specific parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ModelParameters {
    /// Flatten to an ordered map, `extra` entries included
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => {
                let mut out: BTreeMap<String, Value> =
                    map.into_iter().filter(|(k, _)| k != "extra").collect();
                out.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
                out
            }
            _ => BTreeMap::new(),
        }
    }
}

/// A provider/model pair plus call parameters. Immutable once a job is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub parameters: ModelParameters,
}

impl ModelSpec {
    pub fn new(provider: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            name: name.into(),
            parameters: ModelParameters::default(),
        }
    }

    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.parameters.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.parameters.max_tokens = Some(max_tokens);
        self
    }

    /// `provider/name`, used in logs and cache entries
    pub fn identity(&self) -> String {
        format!("{}/{}", self.provider, self.name)
    }
}

/// Token and cost accounting for one provider call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64, cost: f64) -> Self {
        Self { input_tokens, output_tokens, cost }
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
    }
}

/// A fully rendered request handed to a provider adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: ModelSpec,
    /// Name of the question this request answers. Informational only; not
    /// part of the cache key.
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub answer_text: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub raw_response: Value,
}

impl ModelResponse {
    pub fn new(answer_text: impl Into<String>) -> Self {
        let answer_text = answer_text.into();
        let raw_response = Value::String(answer_text.clone());
        Self { answer_text, usage: Usage::default(), raw_response }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_raw_response(mut self, raw_response: Value) -> Self {
        self.raw_response = raw_response;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Timeout,
    RateLimited,
    Transport,
    Authentication,
    InvalidRequest,
    UnsupportedModel,
    Other,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Transport => "transport",
            Self::Authentication => "authentication",
            Self::InvalidRequest => "invalid_request",
            Self::UnsupportedModel => "unsupported_model",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Error half of the provider adapter contract
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
    /// Server-suggested delay before the next attempt
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self { kind, message: message.into(), retryable, retry_after: None }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message, true)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimited, message, true)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Transport, message, true)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Authentication, message, false)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message, false)
    }

    pub fn unsupported_model(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::UnsupportedModel, message, false)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl From<ProviderError> for TaskError {
    fn from(err: ProviderError) -> Self {
        if err.retryable {
            TaskError::ProviderTransient(err.to_string())
        } else {
            TaskError::ProviderFatal(err.to_string())
        }
    }
}

/// Uniform provider adapter. Wire protocols live behind implementations of
/// this trait.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn invoke(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<ModelResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameters_to_map_is_ordered() {
        let mut params =
            ModelParameters { temperature: Some(0.5), max_tokens: Some(100), ..Default::default() };
        params.extra.insert("seed".to_string(), json!(7));
        let map = params.to_map();
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["max_tokens", "seed", "temperature"]);
    }

    #[test]
    fn test_model_spec_identity() {
        let spec = ModelSpec::new("openai", "gpt-4o").with_temperature(0.0);
        assert_eq!(spec.identity(), "openai/gpt-4o");
        assert_eq!(spec, ModelSpec::new("openai", "gpt-4o").with_temperature(0.0));
        assert_ne!(spec, ModelSpec::new("openai", "gpt-4o").with_temperature(1.0));
    }

    #[test]
    fn test_provider_error_maps_to_task_error() {
        let transient: TaskError = ProviderError::rate_limited("slow down").into();
        assert!(matches!(transient, TaskError::ProviderTransient(_)));

        let fatal: TaskError = ProviderError::authentication("bad key").into();
        assert!(matches!(fatal, TaskError::ProviderFatal(_)));
        assert_eq!(fatal.message(), "authentication: bad key");
    }
}
