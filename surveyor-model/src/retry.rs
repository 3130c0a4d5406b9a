use std::{fmt::Display, future::Future, time::Duration};
use surveyor_core::{ProviderError, TaskError};
use tokio_util::sync::CancellationToken;

/// Backoff policy for transient provider failures. `max_attempts` counts the
/// first attempt, so a policy of 3 calls the provider at most 3 times.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries
    #[must_use]
    pub fn disabled() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Delay before the attempt following one that waited `current`
    pub fn next_delay(&self, current: Duration) -> Duration {
        if current >= self.max_delay {
            return self.max_delay;
        }

        let multiplier = self.backoff_multiplier.max(1.0);
        let scaled = Duration::from_secs_f64(current.as_secs_f64() * multiplier);
        scaled.min(self.max_delay)
    }
}

/// Errors that know whether another attempt may succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-suggested minimum wait before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

impl Retryable for TaskError {
    fn is_retryable(&self) -> bool {
        TaskError::is_retryable(self)
    }
}

#[must_use]
pub fn is_retryable_status_code(status_code: u16) -> bool {
    matches!(status_code, 408 | 429 | 500 | 502 | 503 | 504)
}

#[must_use]
pub fn is_retryable_error_message(message: &str) -> bool {
    let normalized = message.to_ascii_uppercase();
    ["429", "408", "500", "502", "503", "504"].iter().any(|code| normalized.contains(code))
        || normalized.contains("RATE LIMIT")
        || normalized.contains("TOO MANY REQUESTS")
        || normalized.contains("RESOURCE_EXHAUSTED")
        || normalized.contains("UNAVAILABLE")
        || normalized.contains("DEADLINE_EXCEEDED")
        || normalized.contains("TIMEOUT")
        || normalized.contains("TIMED OUT")
        || normalized.contains("CONNECTION RESET")
}

/// Classify an HTTP failure from a provider into a [`ProviderError`].
///
/// `retry_after` is the raw `retry-after` header value, in whole seconds.
pub fn provider_error_from_status(
    status_code: u16,
    message: impl Into<String>,
    retry_after: Option<&str>,
) -> ProviderError {
    let message = message.into();
    let error = match status_code {
        429 => ProviderError::rate_limited(message),
        408 | 504 => ProviderError::timeout(message),
        401 | 403 => ProviderError::authentication(message),
        404 => ProviderError::unsupported_model(message),
        code if is_retryable_status_code(code) => ProviderError::transport(message),
        _ => ProviderError::invalid_request(message),
    };
    match retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(secs) => error.with_retry_after(Duration::from_secs(secs)),
        None => error,
    }
}

/// Classify a provider failure known only by its message
pub fn provider_error_from_message(message: impl Into<String>) -> ProviderError {
    let message = message.into();
    let normalized = message.to_ascii_uppercase();
    if normalized.contains("429")
        || normalized.contains("RATE LIMIT")
        || normalized.contains("TOO MANY REQUESTS")
    {
        ProviderError::rate_limited(message)
    } else if normalized.contains("TIMEOUT")
        || normalized.contains("TIMED OUT")
        || normalized.contains("DEADLINE_EXCEEDED")
    {
        ProviderError::timeout(message)
    } else if is_retryable_error_message(&message) {
        ProviderError::transport(message)
    } else {
        ProviderError::new(surveyor_core::ProviderErrorKind::Other, message, false)
    }
}

/// Final result of a retried operation and the number of attempts made
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// exhausts `policy.max_attempts`.
///
/// The operation receives the 1-based attempt number. A retryable error's
/// `retry_after` hint replaces the computed backoff when it is longer. A
/// cancelled token ends the backoff wait early and returns the last error.
pub async fn execute_with_retry<T, E, Op, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: Op,
) -> RetryOutcome<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return RetryOutcome { result: Ok(value), attempts: attempt },
            Err(error)
                if attempt < max_attempts && error.is_retryable() && !cancel.is_cancelled() =>
            {
                let wait = error.retry_after().map_or(delay, |hint| hint.max(delay));
                surveyor_telemetry::warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    error = %error,
                    "Provider request failed with retryable error; retrying"
                );

                let cancelled = tokio::select! {
                    _ = cancel.cancelled() => true,
                    _ = tokio::time::sleep(wait) => false,
                };
                if cancelled {
                    return RetryOutcome { result: Err(error), attempts: attempt };
                }
                delay = policy.next_delay(delay);
            }
            Err(error) => return RetryOutcome { result: Err(error), attempts: attempt },
        }
    }
}
