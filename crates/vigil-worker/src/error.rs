//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Infrastructure failures that stop a media unit from being processed.
///
/// Per-unit outcomes (decode failures, failed or timed out jobs) are not
/// errors at this level: they are alerted and the entry is acknowledged.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid media descriptor: {0}")]
    InvalidMedia(String),

    #[error("Queue operation failed: {0}")]
    QueueFailed(String),

    #[error("Record store error: {0}")]
    Record(#[from] vigil_records::RecordError),

    #[error("Queue error: {0}")]
    Queue(#[from] vigil_queue::QueueError),
}

impl WorkerError {
    pub fn queue_failed(msg: impl Into<String>) -> Self {
        Self::QueueFailed(msg.into())
    }

    /// Whether redelivering the media unit may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Record(e) => e.is_retryable(),
            WorkerError::Queue(e) => e.is_retryable(),
            WorkerError::QueueFailed(_) => true,
            WorkerError::InvalidMedia(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_media_is_permanent() {
        assert!(!WorkerError::InvalidMedia("frame_rate".into()).is_retryable());
        assert!(WorkerError::Record(vigil_records::RecordError::unavailable("down")).is_retryable());
        assert!(!WorkerError::Record(vigil_records::RecordError::rejected("too large")).is_retryable());
    }
}
