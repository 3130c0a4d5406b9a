use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use surveyor_core::{LanguageModel, ProviderError};

/// Provider id to adapter. Every model spec names its provider by id.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LanguageModel>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.providers.keys().collect();
        ids.sort();
        f.debug_struct("ProviderRegistry").field("providers", &ids).finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl Into<String>, model: Arc<dyn LanguageModel>) {
        self.providers.insert(provider.into(), model);
    }

    pub fn with(mut self, provider: impl Into<String>, model: Arc<dyn LanguageModel>) -> Self {
        self.register(provider, model);
        self
    }

    /// An unknown provider is a fatal, non-retryable error
    pub fn get(&self, provider: &str) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        self.providers
            .get(provider)
            .cloned()
            .ok_or_else(|| {
                ProviderError::unsupported_model(format!(
                    "no adapter registered for provider '{}'",
                    provider
                ))
            })
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModel;
    use surveyor_core::ProviderErrorKind;

    #[test]
    fn test_lookup() {
        let registry = ProviderRegistry::new().with("mock", Arc::new(MockModel::new("echo")));
        assert!(registry.contains("mock"));
        assert_eq!(registry.get("mock").unwrap().name(), "echo");

        let err = registry.get("openai").err().unwrap();
        assert_eq!(err.kind, ProviderErrorKind::UnsupportedModel);
        assert!(!err.retryable);
        assert_eq!(format!("{:?}", registry), "ProviderRegistry { providers: [\"mock\"] }");
    }
}
