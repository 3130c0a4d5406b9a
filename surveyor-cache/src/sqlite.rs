//! SQLite store (feature `sqlite`)

use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use crate::store::{CacheEntry, ResponseCache};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;

type EntryRow = (String, String, i64, String, String);

pub struct SqliteCache {
    pool: sqlx::SqlitePool,
}

fn db_error(err: sqlx::Error) -> CacheError {
    CacheError::Database(err.to_string())
}

impl SqliteCache {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(database_url).await.map_err(db_error)?;
        Self::with_pool(pool).await
    }

    /// Single-connection in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: sqlx::SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                model TEXT NOT NULL,
                iteration INTEGER NOT NULL,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db_error)?;

        Ok(Self { pool })
    }
}

fn entry_from_row((key, model, iteration, response, created_at): EntryRow) -> Result<CacheEntry> {
    Ok(CacheEntry {
        key: CacheKey::from(key),
        model,
        iteration: iteration as u32,
        response: serde_json::from_str(&response)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| CacheError::Corrupt { line: 0, message: e.to_string() })?
            .with_timezone(&chrono::Utc),
    })
}

#[async_trait]
impl ResponseCache for SqliteCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(
            r#"
            SELECT key, model, iteration, response, created_at
            FROM response_cache
            WHERE key = ?
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(entry_from_row).transpose()
    }

    async fn put(&self, entry: CacheEntry) -> Result<bool> {
        let response_json = serde_json::to_string(&entry.response)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO response_cache (key, model, iteration, response, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.key.as_str())
        .bind(&entry.model)
        .bind(entry.iteration as i64)
        .bind(&response_json)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn len(&self) -> Result<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM response_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(count as usize)
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT key, model, iteration, response, created_at
            FROM response_cache
            ORDER BY created_at ASC, key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(entry_from_row).collect()
    }
}
