//! Detection backend error types.

use thiserror::Error;

pub type DetectionResult<T> = Result<T, DetectionError>;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Detection backend throttled the request: {0}")]
    Throttled(String),

    #[error("Detection backend unavailable: {0}")]
    Unavailable(String),

    /// Permanent rejection, e.g. invalid input. Never retried.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The job or its source media no longer exists on the backend.
    #[error("Job or media gone: {0}")]
    Gone(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DetectionError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DetectionError::Throttled(_) | DetectionError::Unavailable(_) | DetectionError::Network(_)
        )
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, DetectionError::Gone(_))
    }
}
