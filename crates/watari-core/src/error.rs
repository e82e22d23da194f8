use thiserror::Error;

/// Errors from the core crate (storage, config, validation).
#[derive(Debug, Error)]
pub enum WatariError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid instance URL: {0}")]
    InvalidUrl(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    Channel(String),
}
