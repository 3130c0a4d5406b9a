//! JSON-lines file store
//!
//! One [`CacheEntry`] per line. The file is read once on open and every new
//! entry is appended as a single write, so a crash can at worst leave one
//! truncated trailing line, which is skipped on the next open.

use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::store::{CacheEntry, ResponseCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

pub struct JsonlCache {
    path: PathBuf,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    writer: Mutex<()>,
    skipped_lines: usize,
}

impl JsonlCache {
    /// Open (or create on first write) the cache file at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = HashMap::new();
        let mut skipped_lines = 0;

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (i, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_line(i + 1, line) {
                        Ok(entry) => {
                            entries.entry(entry.key.clone()).or_insert(entry);
                        }
                        Err(err) => {
                            skipped_lines += 1;
                            surveyor_telemetry::warn!(
                                path = %path.display(),
                                error = %err,
                                "Skipping cache line"
                            );
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        surveyor_telemetry::debug!(
            path = %path.display(),
            entries = entries.len(),
            "Opened cache file"
        );
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
            skipped_lines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines that could not be parsed when the file was opened
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    async fn append(&self, entry: &CacheEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.writer.lock().await;
        let mut file =
            tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn parse_line(line: usize, text: &str) -> Result<CacheEntry> {
    serde_json::from_str(text).map_err(|e| CacheError::Corrupt { line, message: e.to_string() })
}

#[async_trait]
impl ResponseCache for JsonlCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, entry: CacheEntry) -> Result<bool> {
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&entry.key) {
                return Ok(false);
            }
            entries.insert(entry.key.clone(), entry.clone());
        }
        if let Err(err) = self.append(&entry).await {
            self.entries.write().await.remove(&entry.key);
            return Err(err);
        }
        Ok(true)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries: Vec<CacheEntry> = self.entries.read().await.values().cloned().collect();
        entries
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }
}
