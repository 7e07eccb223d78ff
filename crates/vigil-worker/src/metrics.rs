//! Job manager metric names.
//!
//! The job manager reports these as [`MetricObservation`]s through its alert
//! sink; [`crate::alerts::MetricsAlertSink`] forwards them to the `metrics`
//! recorder.
//!
//! [`MetricObservation`]: vigil_models::MetricObservation

/// Metric name constants for consistency.
pub mod names {
    /// Time from submission to a terminal state.
    pub const JOB_LATENCY: &str = "vigil_job_latency_seconds";

    /// Terminal jobs by outcome (succeeded, failed, timed_out, abandoned).
    pub const JOBS: &str = "vigil_jobs_total";

    /// Polls sent to the detection backend.
    pub const JOB_POLLS: &str = "vigil_job_polls_total";

    /// Submission retries after transient errors.
    pub const SUBMIT_RETRIES: &str = "vigil_job_submit_retries_total";

    /// Alerts raised, by kind.
    pub const ALERTS: &str = "vigil_alerts_total";

    /// Media units handled by the coordinator, by outcome.
    pub const MEDIA_HANDLED: &str = "vigil_media_handled_total";
}
