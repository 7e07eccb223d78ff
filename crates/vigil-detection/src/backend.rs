//! Detection backend boundary.

use async_trait::async_trait;

use vigil_models::{FrameSample, JobId, MediaUnit};

use crate::error::DetectionResult;
use crate::types::{PollStatus, RawDetection, ResultHandle};

/// Black-box asynchronous object detection service.
///
/// Implementations perform a single request per call; retry and backoff
/// policy belongs to the caller.
#[async_trait]
pub trait DetectionBackend: Send + Sync {
    /// Submit frames of `media` for analysis, returning the backend job id.
    async fn submit(&self, media: &MediaUnit, frames: &[FrameSample]) -> DetectionResult<JobId>;

    /// Check the status of a submitted job.
    async fn poll(&self, job_id: &JobId) -> DetectionResult<PollStatus>;

    /// Fetch the detections of a completed job.
    async fn fetch(&self, result: &ResultHandle) -> DetectionResult<Vec<RawDetection>>;
}
