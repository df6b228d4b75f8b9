use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any mutation; nothing was written.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An optimistic write lost a race. Retry the whole operation from a fresh read.
    #[error("concurrent modification of {key}")]
    ConcurrentModification { key: String },

    #[error("no schedule for learner '{learner_id}' and item '{item_id}'")]
    UnknownSchedule { learner_id: String, item_id: String },

    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::ConcurrentModification { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
