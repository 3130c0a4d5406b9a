//! Run configuration

use crate::error::{Result, RunError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use surveyor_model::RetryPolicy;

/// Which cache operations a run performs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    Off,
    #[default]
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl CacheMode {
    pub fn reads(self) -> bool {
        matches!(self, Self::ReadWrite | Self::ReadOnly)
    }

    pub fn writes(self) -> bool {
        matches!(self, Self::ReadWrite | Self::WriteOnly)
    }
}

/// Per-provider overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderLimits {
    pub max_concurrency: Option<usize>,
    pub requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
    }
}

/// Engine settings. Every field has a default, so a partial TOML file is valid.
///
/// ```toml
/// max_concurrency = 32
/// default_provider_concurrency = 8
/// cache_mode = "read_only"
///
/// [retry]
/// max_attempts = 5
///
/// [providers.openai]
/// max_concurrency = 4
/// requests_per_minute = 500
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_concurrency: usize,
    pub default_provider_concurrency: usize,
    pub providers: BTreeMap<String, ProviderLimits>,
    pub max_concurrent_interviews: usize,
    pub retry: RetryConfig,
    pub validation_retries: u32,
    pub cache_mode: CacheMode,
    pub task_timeout_ms: Option<u64>,
    pub run_timeout_ms: Option<u64>,
    pub stop_on_exception: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 64,
            default_provider_concurrency: 16,
            providers: BTreeMap::new(),
            max_concurrent_interviews: 256,
            retry: RetryConfig::default(),
            validation_retries: 1,
            cache_mode: CacheMode::default(),
            task_timeout_ms: None,
            run_timeout_ms: None,
            stop_on_exception: false,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(RunError::Config("max_concurrency must be at least 1".into()));
        }
        if self.default_provider_concurrency == 0 {
            return Err(RunError::Config("default_provider_concurrency must be at least 1".into()));
        }
        if self.max_concurrent_interviews == 0 {
            return Err(RunError::Config("max_concurrent_interviews must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RunError::Config("retry.max_attempts must be at least 1".into()));
        }
        for (provider, limits) in &self.providers {
            if limits.max_concurrency == Some(0) {
                return Err(RunError::Config(format!(
                    "providers.{}.max_concurrency must be at least 1",
                    provider
                )));
            }
            if limits.requests_per_minute == Some(0) {
                return Err(RunError::Config(format!(
                    "providers.{}.requests_per_minute must be at least 1",
                    provider
                )));
            }
        }
        Ok(())
    }

    /// Concurrency ceiling for one provider
    pub fn provider_concurrency(&self, provider: &str) -> usize {
        self.providers
            .get(provider)
            .and_then(|l| l.max_concurrency)
            .unwrap_or(self.default_provider_concurrency)
    }

    pub fn requests_per_minute(&self, provider: &str) -> Option<u32> {
        self.providers.get(provider).and_then(|l| l.requests_per_minute)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub fn with_provider_concurrency(mut self, max_concurrency: usize) -> Self {
        self.default_provider_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>, limits: ProviderLimits) -> Self {
        self.providers.insert(provider.into(), limits);
        self
    }

    #[must_use]
    pub fn with_max_concurrent_interviews(mut self, max_concurrent_interviews: usize) -> Self {
        self.max_concurrent_interviews = max_concurrent_interviews;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_validation_retries(mut self, validation_retries: u32) -> Self {
        self.validation_retries = validation_retries;
        self
    }

    #[must_use]
    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    #[must_use]
    pub fn with_stop_on_exception(mut self, stop_on_exception: bool) -> Self {
        self.stop_on_exception = stop_on_exception;
        self
    }
}
