use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache entry at line {line}: {message}")]
    Corrupt { line: usize, message: String },

    #[cfg(feature = "sqlite")]
    #[error("Cache database error: {0}")]
    Database(String),
}

impl From<CacheError> for surveyor_core::TaskError {
    fn from(err: CacheError) -> Self {
        surveyor_core::TaskError::Cache(err.to_string())
    }
}
