//! Alerting and metrics sink boundary.
//!
//! The pipeline reports terminal failures and named observations through an
//! [`AlertSink`]. Implementations must be fire-and-forget: neither method may
//! block or fail the caller.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{JobId, MediaId};

/// Category of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Media could not be opened or produced no frames
    DecodeFailed,
    /// Submission rejected or retries exhausted
    SubmissionFailed,
    /// Backend reported failure or results could not be fetched
    JobFailed,
    /// Timeout ceiling or poll budget exhausted
    PollTimeout,
    /// Result indexing failed after retries
    IndexWriteFailed,
    /// Query could not reach the record or blob store
    QueryBackendUnavailable,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::DecodeFailed => "decode_failed",
            AlertKind::SubmissionFailed => "submission_failed",
            AlertKind::JobFailed => "job_failed",
            AlertKind::PollTimeout => "poll_timeout",
            AlertKind::IndexWriteFailed => "index_write_failed",
            AlertKind::QueryBackendUnavailable => "query_backend_unavailable",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single alert, raised once per failed media unit or query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlertEvent {
    pub kind: AlertKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<MediaId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub reason: String,
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn for_media(kind: AlertKind, media_id: MediaId, reason: impl Into<String>) -> Self {
        Self {
            kind,
            media_id: Some(media_id),
            job_id: None,
            reason: reason.into(),
            raised_at: Utc::now(),
        }
    }

    pub fn for_query(reason: impl Into<String>) -> Self {
        Self {
            kind: AlertKind::QueryBackendUnavailable,
            media_id: None,
            job_id: None,
            reason: reason.into(),
            raised_at: Utc::now(),
        }
    }

    pub fn with_job(mut self, job_id: Option<JobId>) -> Self {
        self.job_id = job_id;
        self
    }
}

/// How an observation should be aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricUnit {
    /// Monotonic count, `value` is the increment
    Count,
    /// Duration sample in seconds
    Seconds,
}

/// A named metric observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricObservation {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<(String, String)>,
}

impl MetricObservation {
    pub fn count(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 1.0,
            unit: MetricUnit::Count,
            labels: Vec::new(),
        }
    }

    pub fn seconds(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            unit: MetricUnit::Seconds,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }
}

/// External alerting and metrics collaborator.
pub trait AlertSink: Send + Sync {
    /// Raise a threshold-triggered alert.
    fn alert(&self, event: AlertEvent);

    /// Record a named observation.
    fn observe(&self, _observation: MetricObservation) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn alert(&self, _event: AlertEvent) {}
}
