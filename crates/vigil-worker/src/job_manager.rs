//! Job manager: drives one detection job from submission to a terminal state.
//!
//! ```text
//! Pending -> Submitted -> Polling* -> Succeeded
//!                    \-> Failed | TimedOut | Abandoned
//! ```
//!
//! Transient errors are retried locally and never surfaced. Each terminal
//! failure raises exactly one alert; abandoned jobs raise none.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, Instrument};

use vigil_detection::{
    normalize_detections, DetectionBackend, DetectionError, PollStatus, RawDetection, ResultHandle,
};
use vigil_models::{
    AlertEvent, AlertKind, AlertSink, Detection, DetectionJob, DetectionRecord, FrameSample, JobId,
    JobState, MediaUnit, MetricObservation,
};
use vigil_records::{IndexWriteError, ResultIndexer};
use vigil_storage::BlobStore;

use crate::config::PollPolicy;
use crate::logging::JobLogger;
use crate::metrics::names;
use crate::retry::{retry_async, Backoff, RetryConfig, RetryResult};

/// Final state of one job and the records it committed.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: DetectionJob,
    pub records: Vec<DetectionRecord>,
}

impl JobReport {
    pub fn state(&self) -> JobState {
        self.job.state
    }
}

/// Why a job stopped short of committed results.
struct Termination {
    state: JobState,
    alert: Option<AlertKind>,
    reason: String,
}

impl Termination {
    fn failed(kind: AlertKind, reason: impl Into<String>) -> Self {
        Self {
            state: JobState::Failed,
            alert: Some(kind),
            reason: reason.into(),
        }
    }

    fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            state: JobState::TimedOut,
            alert: Some(AlertKind::PollTimeout),
            reason: reason.into(),
        }
    }

    fn abandoned(reason: impl Into<String>) -> Self {
        Self {
            state: JobState::Abandoned,
            alert: None,
            reason: reason.into(),
        }
    }
}

fn advance(job: &mut DetectionJob, next: JobState) {
    if let Err(e) = job.transition(next) {
        error!(media_id = %job.media_id, job_id = job.job_id_str(), error = %e, "Rejected job transition");
    }
}

/// Submits media to the detection backend and tracks jobs to completion.
pub struct JobManager {
    backend: Arc<dyn DetectionBackend>,
    blobs: Arc<dyn BlobStore>,
    indexer: Arc<ResultIndexer>,
    alerts: Arc<dyn AlertSink>,
    policy: PollPolicy,
}

impl JobManager {
    pub fn new(
        backend: Arc<dyn DetectionBackend>,
        blobs: Arc<dyn BlobStore>,
        indexer: Arc<ResultIndexer>,
        alerts: Arc<dyn AlertSink>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            backend,
            blobs,
            indexer,
            alerts,
            policy,
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::from(&self.policy)
    }

    /// Submit and track in one call.
    pub async fn run(&self, media: &MediaUnit, frames: &[FrameSample]) -> JobReport {
        let job = self.submit(media, frames).await;
        self.track(job, media).await
    }

    /// Submit `frames` of `media` to the backend.
    ///
    /// Returns the job in `Submitted` state, or already terminal when the
    /// backend rejected the submission or transient errors outlasted the
    /// retry budget.
    pub async fn submit(&self, media: &MediaUnit, frames: &[FrameSample]) -> DetectionJob {
        let mut job = DetectionJob::new(media.id.clone());
        let logger = JobLogger::new(media);
        logger.log_start(&format!("submitting {} frames", frames.len()));

        let config = RetryConfig::new("submit", self.backoff())
            .with_max_retries(self.policy.max_submit_retries);
        let result = retry_async(&config, DetectionError::is_retryable, || {
            self.backend.submit(media, frames)
        })
        .await;

        match result {
            RetryResult::Success { value: job_id, retries } => {
                if retries > 0 {
                    let mut observation = MetricObservation::count(names::SUBMIT_RETRIES);
                    observation.value = f64::from(retries);
                    self.alerts.observe(observation);
                }
                let logger = logger.with_job(&job_id);
                match job.mark_submitted(job_id) {
                    Ok(()) => logger.log_progress("accepted by detection backend"),
                    Err(e) => logger.log_error(&e.to_string()),
                }
            }
            RetryResult::Failed { error, attempts } => {
                let termination = if error.is_gone() {
                    Termination::abandoned(format!("media gone at submission: {}", error))
                } else {
                    Termination::failed(
                        AlertKind::SubmissionFailed,
                        format!("submission failed after {} attempt(s): {}", attempts, error),
                    )
                };
                self.terminate(&mut job, &logger, termination);
            }
        }
        job
    }

    /// Poll a submitted job to completion, fetch and commit its results.
    ///
    /// Jobs that are not in `Submitted` state are returned unchanged.
    pub async fn track(&self, mut job: DetectionJob, media: &MediaUnit) -> JobReport {
        let Some(job_id) = job.job_id.clone() else {
            return JobReport { job, records: Vec::new() };
        };
        if job.state != JobState::Submitted {
            return JobReport { job, records: Vec::new() };
        }

        let logger = JobLogger::new(media).with_job(&job_id);
        let span = logger.create_span();

        async move {
            match self.drive(&mut job, media, &job_id, &logger).await {
                Ok(records) => {
                    self.observe_outcome(&job);
                    logger.log_completion(&format!(
                        "{} polls, {} records committed",
                        job.attempts,
                        records.len()
                    ));
                    JobReport { job, records }
                }
                Err(termination) => {
                    self.terminate(&mut job, &logger, termination);
                    JobReport {
                        job,
                        records: Vec::new(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        job: &mut DetectionJob,
        media: &MediaUnit,
        job_id: &JobId,
        logger: &JobLogger,
    ) -> Result<Vec<DetectionRecord>, Termination> {
        let handle = self.poll_to_completion(job, media, job_id, logger).await?;
        let raw = self.fetch_results(&handle).await?;
        let detections = normalize_detections(&raw);
        logger.log_progress(&format!(
            "fetched {} detections ({} usable)",
            raw.len(),
            detections.len()
        ));

        advance(job, JobState::Succeeded);
        self.commit(job, &detections).await
    }

    async fn poll_to_completion(
        &self,
        job: &mut DetectionJob,
        media: &MediaUnit,
        job_id: &JobId,
        logger: &JobLogger,
    ) -> Result<ResultHandle, Termination> {
        let backoff = self.backoff();
        let deadline = Instant::now() + self.policy.timeout;

        loop {
            if job.attempts >= self.policy.max_attempts {
                return Err(Termination::timed_out(format!(
                    "no completion after {} polls",
                    job.attempts
                )));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(backoff.jittered(job.attempts).min(remaining)).await;
            if Instant::now() >= deadline {
                return Err(Termination::timed_out(format!(
                    "no completion within {}s of submission",
                    self.policy.timeout.as_secs()
                )));
            }

            let status = self.backend.poll(job_id).await;
            job.record_poll();
            self.alerts.observe(MetricObservation::count(names::JOB_POLLS));

            match status {
                Ok(PollStatus::Succeeded { result }) => return Ok(result),
                Ok(PollStatus::Failed { reason }) => {
                    return Err(Termination::failed(
                        AlertKind::JobFailed,
                        format!("backend reported failure: {}", reason),
                    ))
                }
                Ok(PollStatus::InProgress) => {
                    advance(job, JobState::Polling);
                    if self.media_gone(media, logger).await {
                        return Err(Termination::abandoned("source media no longer exists"));
                    }
                }
                Err(e) if e.is_gone() => {
                    return Err(Termination::abandoned(format!("backend lost job: {}", e)))
                }
                Err(e) if e.is_retryable() => {
                    advance(job, JobState::Polling);
                    logger.log_warning(&format!("transient poll error: {}", e));
                }
                Err(e) => {
                    return Err(Termination::failed(
                        AlertKind::JobFailed,
                        format!("poll failed: {}", e),
                    ))
                }
            }
        }
    }

    /// Whether the media's stored bytes were withdrawn while polling.
    async fn media_gone(&self, media: &MediaUnit, logger: &JobLogger) -> bool {
        match self.blobs.exists(&media.storage_ref).await {
            Ok(exists) => !exists,
            Err(e) => {
                logger.log_warning(&format!("existence check failed: {}", e));
                false
            }
        }
    }

    async fn fetch_results(&self, handle: &ResultHandle) -> Result<Vec<RawDetection>, Termination> {
        let config = RetryConfig::new("fetch", self.backoff())
            .with_max_retries(self.policy.max_submit_retries);

        match retry_async(&config, DetectionError::is_retryable, || self.backend.fetch(handle)).await {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed { error, .. } if error.is_gone() => Err(Termination::abandoned(
                format!("results gone before fetch: {}", error),
            )),
            RetryResult::Failed { error, attempts } => Err(Termination::failed(
                AlertKind::JobFailed,
                format!("result fetch failed after {} attempt(s): {}", attempts, error),
            )),
        }
    }

    async fn commit(
        &self,
        job: &DetectionJob,
        detections: &[Detection],
    ) -> Result<Vec<DetectionRecord>, Termination> {
        let config = RetryConfig::new("index_commit", self.backoff())
            .with_max_retries(self.policy.max_commit_retries);

        match retry_async(&config, IndexWriteError::is_retryable, || {
            self.indexer.commit(job, detections)
        })
        .await
        {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed { error, attempts } => Err(Termination::failed(
                AlertKind::IndexWriteFailed,
                format!("index commit failed after {} attempt(s): {}", attempts, error),
            )),
        }
    }

    /// Settle a job in a terminal state: metrics, logs, and at most one alert.
    fn terminate(&self, job: &mut DetectionJob, logger: &JobLogger, termination: Termination) {
        if let Err(e) = job.finish_with_error(termination.state, termination.reason.clone()) {
            error!(media_id = %job.media_id, error = %e, "Rejected job transition");
        }
        self.observe_outcome(job);

        match termination.alert {
            Some(kind) => {
                logger.log_error(&termination.reason);
                self.alerts.alert(
                    AlertEvent::for_media(kind, job.media_id.clone(), termination.reason)
                        .with_job(job.job_id.clone()),
                );
            }
            None => logger.log_completion(&format!("abandoned: {}", termination.reason)),
        }
    }

    fn observe_outcome(&self, job: &DetectionJob) {
        self.alerts.observe(
            MetricObservation::count(names::JOBS).with_label("outcome", job.state.as_str()),
        );
        if let Some(submitted_at) = job.submitted_at {
            let latency = (Utc::now() - submitted_at).to_std().unwrap_or_default();
            self.alerts.observe(MetricObservation::seconds(
                names::JOB_LATENCY,
                latency.as_secs_f64(),
            ));
        }
    }
}
