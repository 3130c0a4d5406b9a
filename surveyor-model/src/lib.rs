//! # surveyor-model
//!
//! Support for calling language-model providers through the
//! [`LanguageModel`](surveyor_core::LanguageModel) adapter contract.
//!
//! - [`RetryPolicy`] / [`execute_with_retry`] - exponential backoff for transient failures
//! - [`RequestRateLimiter`] - per-provider requests-per-minute token bucket
//! - [`ProviderRegistry`] - provider id to adapter lookup
//! - [`MockModel`] - scripted provider for tests and dry runs

pub mod mock;
pub mod rate_limit;
pub mod registry;
pub mod retry;

pub use mock::{MockModel, Responder};
pub use rate_limit::RequestRateLimiter;
pub use registry::ProviderRegistry;
pub use retry::{
    RetryOutcome, RetryPolicy, Retryable, execute_with_retry, is_retryable_error_message,
    is_retryable_status_code, provider_error_from_message, provider_error_from_status,
};
