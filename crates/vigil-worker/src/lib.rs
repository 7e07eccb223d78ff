//! Detection pipeline worker.
//!
//! This crate provides:
//! - The job manager (submit, poll with backoff, fetch, commit)
//! - The pipeline coordinator chaining sampling, detection and indexing
//! - A queue executor with bounded concurrency, redelivery and DLQ handling
//! - Alert and metric forwarding
//! - Graceful shutdown

pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod inflight;
pub mod job_manager;
pub mod locator;
pub mod logging;
pub mod metrics;
pub mod retry;

pub use alerts::MetricsAlertSink;
pub use config::{PollPolicy, SamplerConfig, WorkerConfig};
pub use coordinator::{Pipeline, PipelineOutcome};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use inflight::{InFlightClaim, InFlightJobs};
pub use job_manager::{JobManager, JobReport};
pub use locator::BlobMediaLocator;
pub use logging::JobLogger;
