//! Shared data models for the Vigil detection pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Media units and sampled frames
//! - Detection jobs and their state machine
//! - Normalized detections and persisted detection records
//! - Query criteria, hits and access handles
//! - Alert events and the alerting sink boundary

pub mod alert;
pub mod detection;
pub mod frame;
pub mod ids;
pub mod job;
pub mod media;
pub mod query;

// Re-export common types
pub use alert::{AlertEvent, AlertKind, AlertSink, MetricObservation, MetricUnit, NoopAlertSink};
pub use detection::{normalize_label, Detection, DetectionRecord};
pub use frame::FrameSample;
pub use ids::{JobId, MediaId, RecordId, StorageRef};
pub use job::{DetectionJob, JobState, TransitionError};
pub use media::{MediaUnit, Resolution};
pub use query::{AccessHandle, CriteriaError, QueryCriteria, QueryHit, TimeRange};
