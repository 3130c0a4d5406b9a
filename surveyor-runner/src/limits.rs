//! Global and per-provider concurrency ceilings

use crate::config::RunConfig;
use std::collections::HashMap;
use std::sync::Arc;
use surveyor_model::RequestRateLimiter;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

struct ProviderGate {
    semaphore: Arc<Semaphore>,
    rate: Option<RequestRateLimiter>,
}

/// Work-pool ceilings shared by every task of a run
pub struct ConcurrencyLimits {
    global: Arc<Semaphore>,
    providers: HashMap<String, ProviderGate>,
    fallback: Arc<Semaphore>,
}

/// Held for the whole provider dispatch of one task
pub struct DispatchPermit {
    _provider: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ConcurrencyLimits {
    pub fn new<'a>(config: &RunConfig, providers: impl IntoIterator<Item = &'a str>) -> Self {
        let mut gates = HashMap::new();
        for provider in providers {
            gates.entry(provider.to_string()).or_insert_with(|| ProviderGate {
                semaphore: Arc::new(Semaphore::new(config.provider_concurrency(provider))),
                rate: config.requests_per_minute(provider).map(RequestRateLimiter::per_minute),
            });
        }
        Self {
            global: Arc::new(Semaphore::new(config.max_concurrency)),
            providers: gates,
            fallback: Arc::new(Semaphore::new(config.default_provider_concurrency)),
        }
    }

    /// Acquire the provider permit, then the global one. Returns `None` when
    /// cancellation is observed first.
    pub async fn acquire(
        &self,
        provider: &str,
        cancel: &CancellationToken,
    ) -> Option<DispatchPermit> {
        let semaphore = self.providers.get(provider).map_or(&self.fallback, |g| &g.semaphore);
        let provider_permit = acquire_owned(semaphore, cancel).await?;
        let global_permit = acquire_owned(&self.global, cancel).await?;
        Some(DispatchPermit { _provider: provider_permit, _global: global_permit })
    }

    /// Wait for the provider's request-rate budget, if it has one
    pub async fn throttle(&self, provider: &str) {
        if let Some(rate) = self.providers.get(provider).and_then(|g| g.rate.as_ref()) {
            rate.acquire().await;
        }
    }

    pub fn available_global(&self) -> usize {
        self.global.available_permits()
    }
}

async fn acquire_owned(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Option<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
    }
}
