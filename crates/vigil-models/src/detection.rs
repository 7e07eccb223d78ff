//! Normalized detections and persisted detection records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::{JobId, MediaId, RecordId};
use crate::media::MediaUnit;

/// Canonical form of an object label: trimmed and lower-cased.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// One (label, confidence, offset) tuple produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Normalized object label
    pub label: String,
    /// Confidence in `[0, 1]`
    pub confidence: f32,
    /// Offset within the media, in milliseconds
    pub offset_ms: u64,
}

impl Detection {
    /// Normalize raw backend output.
    ///
    /// Percent-scale confidences (`> 1.0`) are divided by 100. Returns `None`
    /// for blank labels, non-finite confidences, or offsets that do not fit a
    /// signed millisecond delta.
    pub fn normalize(label: &str, confidence: f32, offset: Duration) -> Option<Self> {
        let label = normalize_label(label);
        if label.is_empty() || !confidence.is_finite() {
            return None;
        }
        let offset_ms = u64::try_from(offset.as_millis()).ok()?;
        chrono::Duration::try_milliseconds(i64::try_from(offset_ms).ok()?)?;
        let confidence = if confidence > 1.0 {
            confidence / 100.0
        } else {
            confidence
        };
        Some(Self {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            offset_ms,
        })
    }

    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms)
    }
}

/// One persisted, queryable detection fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionRecord {
    pub record_id: RecordId,
    pub media_id: MediaId,
    /// Job that produced the record (dedup key at the store)
    pub job_id: JobId,
    pub camera_id: String,
    pub location: String,
    pub label: String,
    pub confidence: f32,
    /// Offset within the media, in milliseconds
    pub offset_ms: u64,
    /// Wall-clock time of the detection (`ingested_at + offset`)
    pub detected_at: DateTime<Utc>,
}

impl DetectionRecord {
    /// Derive the record for the `index`-th detection of a job.
    ///
    /// `None` when `ingested_at + offset` falls outside the representable
    /// calendar range.
    pub fn derive(
        job_id: &JobId,
        index: usize,
        media: &MediaUnit,
        detection: &Detection,
    ) -> Option<Self> {
        let offset = i64::try_from(detection.offset_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)?;
        let detected_at = media.ingested_at.checked_add_signed(offset)?;
        Some(Self {
            record_id: RecordId::for_detection(job_id, index),
            media_id: media.id.clone(),
            job_id: job_id.clone(),
            camera_id: media.camera_id.clone(),
            location: media.location.clone(),
            label: detection.label.clone(),
            confidence: detection.confidence,
            offset_ms: detection.offset_ms,
            detected_at,
        })
    }

    /// Sort key: detection time ascending, ties broken by record id.
    pub fn sort_key(&self) -> (DateTime<Utc>, &RecordId) {
        (self.detected_at, &self.record_id)
    }
}
