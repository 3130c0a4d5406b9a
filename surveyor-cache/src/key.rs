//! Cache key derivation

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;
use surveyor_core::{ModelSpec, RenderedPrompt};

/// Lowercase hex SHA-256 over the canonical request description.
///
/// The question name is not part of the key: two questions that render to
/// the same prompts for the same model share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(prompt: &RenderedPrompt, model: &ModelSpec, iteration: u32) -> Self {
        // serde_json maps are sorted, so the serialized form is canonical
        let canonical = json!({
            "system_prompt": prompt.system_prompt,
            "user_prompt": prompt.user_prompt,
            "provider": model.provider,
            "model": model.name,
            "parameters": model.parameters.to_map(),
            "iteration": iteration,
        });
        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
