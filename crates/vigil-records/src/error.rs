//! Record store, indexer and query error types.

use thiserror::Error;

use vigil_models::{CriteriaError, JobState, MediaId};

/// Result type for record store operations.
pub type RecordResult<T> = Result<T, RecordError>;

/// Errors raised by a record store engine.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Batch rejected: {0}")]
    Rejected(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecordError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecordError::Unavailable(_) => true,
            RecordError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            _ => false,
        }
    }
}

/// Failure to commit a job's detections.
#[derive(Debug, Error)]
pub enum IndexWriteError {
    #[error("Job for media {media_id} is {state}, only succeeded jobs can be indexed")]
    JobNotSucceeded { media_id: MediaId, state: JobState },

    #[error("Job for media {0} has no backend job id")]
    MissingJobId(MediaId),

    #[error("Media {0} is not registered in the record store")]
    MediaNotRegistered(MediaId),

    #[error("Store rejected batch: {0}")]
    Store(#[from] RecordError),
}

impl IndexWriteError {
    /// Whether retrying the same commit may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexWriteError::Store(e) if e.is_retryable())
    }
}

/// Query failure kinds, distinguishable by a front-end.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] CriteriaError),

    #[error("No detections match the query")]
    NotFound,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl QueryError {
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }
}
