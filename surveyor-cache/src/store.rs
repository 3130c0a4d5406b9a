//! Response cache contract and the in-memory store

use crate::error::Result;
use crate::key::CacheKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use surveyor_core::{ModelResponse, ModelSpec};
use tokio::sync::RwLock;

/// A provider response stored under its key. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// `provider/name` of the model that produced the response
    pub model: String,
    pub iteration: u32,
    pub response: ModelResponse,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: CacheKey, model: &ModelSpec, iteration: u32, response: ModelResponse) -> Self {
        Self { key, model: model.identity(), iteration, response, created_at: Utc::now() }
    }
}

/// Content-addressed response store shared by every interview of a run
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store an entry unless its key is already present. Returns whether the
    /// entry was written.
    async fn put(&self, entry: CacheEntry) -> Result<bool>;

    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>>;
}

#[derive(Default, Clone)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cache with existing entries, first entry per key wins
    pub fn with_entries(entries: impl IntoIterator<Item = CacheEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            map.entry(entry.key.clone()).or_insert(entry);
        }
        Self { entries: Arc::new(RwLock::new(map)) }
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.key) {
            return Ok(false);
        }
        entries.insert(entry.key.clone(), entry);
        Ok(true)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }
}
