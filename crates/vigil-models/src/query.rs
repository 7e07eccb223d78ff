//! Query criteria, results and access handles.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::{normalize_label, DetectionRecord};
use crate::ids::{MediaId, StorageRef};

/// Time window over detection timestamps. Both bounds inclusive, either optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

/// Why a set of criteria cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CriteriaError {
    #[error("at least one of camera_id, object_type or time range is required")]
    Empty,

    #[error("{0} must not be blank")]
    Blank(&'static str),

    #[error("time range start {start} is after end {end}")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Conjunctive filter over detection records. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueryCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl QueryCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = Some(camera_id.into());
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// True when no criterion would restrict the scan.
    pub fn is_empty(&self) -> bool {
        self.camera_id.is_none()
            && self.object_type.is_none()
            && self.time_range.map_or(true, |r| r.is_unbounded())
    }

    /// Validate and return the canonical form (object type normalized).
    pub fn normalized(&self) -> Result<Self, CriteriaError> {
        if self.is_empty() {
            return Err(CriteriaError::Empty);
        }
        if self.camera_id.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(CriteriaError::Blank("camera_id"));
        }
        let object_type = match self.object_type.as_deref() {
            Some(label) => {
                let label = normalize_label(label);
                if label.is_empty() {
                    return Err(CriteriaError::Blank("object_type"));
                }
                Some(label)
            }
            None => None,
        };
        let time_range = self.time_range.filter(|r| !r.is_unbounded());
        if let Some(TimeRange {
            start: Some(start),
            end: Some(end),
        }) = time_range
        {
            if start > end {
                return Err(CriteriaError::InvertedRange { start, end });
            }
        }
        Ok(Self {
            camera_id: self.camera_id.as_ref().map(|c| c.trim().to_string()),
            object_type,
            time_range,
        })
    }

    /// Check a record against every present criterion.
    ///
    /// Expects criteria produced by [`QueryCriteria::normalized`].
    pub fn matches(&self, record: &DetectionRecord) -> bool {
        self.camera_id.as_deref().map_or(true, |c| record.camera_id == c)
            && self.object_type.as_deref().map_or(true, |l| record.label == l)
            && self.time_range.map_or(true, |r| r.contains(record.detected_at))
    }
}

/// Time-limited read access to a media unit's stored bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccessHandle {
    pub target: StorageRef,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessHandle {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One distinct media unit matching a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryHit {
    pub media_id: MediaId,
    pub storage_ref: StorageRef,
    pub camera_id: String,
    pub location: String,
    /// Earliest matching detection within this media
    pub first_detected_at: DateTime<Utc>,
    /// Distinct matched labels, in first-seen order
    pub labels: Vec<String>,
    pub handle: AccessHandle,
}
