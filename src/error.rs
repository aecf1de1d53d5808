use thiserror::Error;

/// Failures surfaced by the ingestion pipeline and the aggregation engine.
///
/// Duplicate pulses never show up here. They are absorbed by the batch dedup and by the
/// repository's hash uniqueness.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ActivityError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type ActivityResult<T> = Result<T, ActivityError>;
