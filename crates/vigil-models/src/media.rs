//! Ingested media unit descriptor.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::ids::{MediaId, StorageRef};

/// Frame resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single ingested video segment.
///
/// Created by the ingestion boundary once the segment is durably stored and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MediaUnit {
    /// Unique media ID
    pub id: MediaId,
    /// Camera that captured the segment
    #[validate(length(min = 1, max = 128))]
    pub camera_id: String,
    /// Physical capture location
    #[validate(length(min = 1, max = 256))]
    pub location: String,
    /// Source resolution
    #[validate(custom(function = "validate_resolution"))]
    pub resolution: Resolution,
    /// Source frame rate (frames per second)
    #[validate(range(exclusive_min = 0.0, max = 1000.0))]
    pub frame_rate: f64,
    /// Container/codec format (e.g. "H.264")
    #[validate(length(min = 1, max = 64))]
    pub format: String,
    /// Where the segment bytes live in the blob store
    #[validate(custom(function = "validate_storage_ref"))]
    pub storage_ref: StorageRef,
    /// When the segment was ingested (start of capture)
    pub ingested_at: DateTime<Utc>,
}

impl MediaUnit {
    /// Create a new media unit with a fresh ID, ingested now.
    pub fn new(
        camera_id: impl Into<String>,
        location: impl Into<String>,
        storage_ref: StorageRef,
    ) -> Self {
        Self {
            id: MediaId::new(),
            camera_id: camera_id.into(),
            location: location.into(),
            resolution: Resolution::new(1920, 1080),
            frame_rate: 30.0,
            format: "H.264".to_string(),
            storage_ref,
            ingested_at: Utc::now(),
        }
    }

    /// Set the media ID.
    pub fn with_id(mut self, id: MediaId) -> Self {
        self.id = id;
        self
    }

    /// Set the source resolution.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the frame rate.
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Set the format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Set the ingestion timestamp.
    pub fn with_ingested_at(mut self, ingested_at: DateTime<Utc>) -> Self {
        self.ingested_at = ingested_at;
        self
    }

    /// Idempotency key used by the ingestion queue.
    pub fn idempotency_key(&self) -> String {
        format!("ingest:{}", self.id)
    }
}

fn validate_resolution(resolution: &Resolution) -> Result<(), ValidationError> {
    if resolution.width == 0 || resolution.height == 0 {
        return Err(ValidationError::new("resolution_must_be_positive"));
    }
    Ok(())
}

fn validate_storage_ref(storage_ref: &StorageRef) -> Result<(), ValidationError> {
    if storage_ref.is_empty() {
        return Err(ValidationError::new("storage_ref_required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> MediaUnit {
        MediaUnit::new("cam-1", "Lobby", StorageRef::new("videos/cam-1/a.mp4"))
    }

    #[test]
    fn test_valid_media_unit() {
        assert!(unit().validate().is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut media = unit();
        media.camera_id.clear();
        assert!(media.validate().is_err());

        let media = unit().with_format("");
        assert!(media.validate().is_err());

        let mut media = unit();
        media.storage_ref = StorageRef::new("  ");
        assert!(media.validate().is_err());
    }

    #[test]
    fn test_zero_resolution_and_frame_rate_rejected() {
        assert!(unit().with_resolution(Resolution::new(0, 720)).validate().is_err());
        assert!(unit().with_frame_rate(0.0).validate().is_err());
    }

    #[test]
    fn test_idempotency_key() {
        let media = unit().with_id(MediaId::from_string("abc"));
        assert_eq!(media.idempotency_key(), "ingest:abc");
    }
}
