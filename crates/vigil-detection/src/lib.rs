//! Detection backend boundary for the Vigil pipeline.
//!
//! Provides the submit/poll/fetch [`DetectionBackend`] trait, an HTTP
//! implementation, and normalization of raw backend output.

pub mod backend;
pub mod client;
pub mod error;
pub mod types;

pub use backend::DetectionBackend;
pub use client::{DetectionClientConfig, HttpDetectionClient};
pub use error::{DetectionError, DetectionResult};
pub use types::{normalize_detections, PollStatus, RawDetection, ResultHandle};
