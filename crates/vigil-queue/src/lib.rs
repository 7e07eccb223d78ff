//! Redis plumbing for the Vigil pipeline.
//!
//! This crate provides:
//! - The media ingestion queue (Redis Streams, consumer group, DLQ)
//! - Alert publication via Redis Pub/Sub

pub mod alerts;
pub mod error;
pub mod ingest;

pub use alerts::{RedisAlertChannel, ALERT_CHANNEL};
pub use error::{QueueError, QueueResult};
pub use ingest::{Delivery, IngestEnvelope, IngestQueue, QueueConfig};
