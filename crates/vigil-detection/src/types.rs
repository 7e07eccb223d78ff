//! Detection backend wire types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use vigil_models::{Detection, MediaUnit};

/// Opaque handle to a completed job's results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultHandle(pub String);

impl ResultHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    InProgress,
    Succeeded { result: ResultHandle },
    Failed { reason: String },
}

/// Media descriptor sent alongside submitted frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMedia {
    pub media_id: String,
    pub storage_ref: String,
    pub camera_id: String,
}

impl From<&MediaUnit> for SubmitMedia {
    fn from(media: &MediaUnit) -> Self {
        Self {
            media_id: media.id.to_string(),
            storage_ref: media.storage_ref.to_string(),
            camera_id: media.camera_id.clone(),
        }
    }
}

/// Response to a job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

/// Remote job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    InProgress,
    Succeeded,
    Failed,
}

/// Response to a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResponse {
    pub status: RemoteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One raw detection as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    /// Either a `[0, 1]` probability or a percentage
    pub confidence: f32,
    pub offset_ms: u64,
}

/// Response to a result fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Normalize raw backend output into detection tuples.
///
/// Unusable entries (blank labels, non-finite confidence) are dropped; order
/// is preserved so record ids stay stable across recommits.
pub fn normalize_detections(raw: &[RawDetection]) -> Vec<Detection> {
    raw.iter()
        .filter_map(|d| {
            Detection::normalize(&d.label, d.confidence, Duration::from_millis(d.offset_ms))
        })
        .collect()
}
