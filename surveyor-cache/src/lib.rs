//! # surveyor-cache
//!
//! Content-addressed store of provider responses. Keys are derived from the
//! rendered prompts, the model identity, its call parameters and the
//! iteration number, so an identical request is answered at most once.
//!
//! Stores:
//! - [`MemoryCache`] - shared in-process map
//! - [`JsonlCache`] - JSON-lines file, loaded on open and appended on write
//! - `SqliteCache` - SQLite table (requires the `sqlite` feature)
//!
//! Writes are write-once: the first entry stored under a key is kept.

pub mod error;
pub mod jsonl;
pub mod key;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod store;

pub use error::{CacheError, Result};
pub use jsonl::JsonlCache;
pub use key::CacheKey;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCache;
pub use store::{CacheEntry, MemoryCache, ResponseCache};
