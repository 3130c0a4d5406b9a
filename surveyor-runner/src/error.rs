use surveyor_cache::CacheError;
use surveyor_core::SurveyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunError>;

/// Errors that prevent a run from starting or finishing. Task-level failures
/// are recorded in the results and never surface here.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Survey(#[from] SurveyError),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Interview driver failed: {0}")]
    Join(String),
}
