use cadence_core::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Conditional write found a different version than the one read.
    #[error("version conflict on {key}")]
    Conflict { key: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { key } => EngineError::ConcurrentModification { key },
            other => EngineError::Storage(Box::new(other)),
        }
    }
}
