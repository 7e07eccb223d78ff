//! Pipeline coordinator: sample -> submit -> poll -> index for one media unit.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use validator::Validate;

use vigil_media::FrameSampler;
use vigil_models::{AlertEvent, AlertKind, AlertSink, MediaUnit, MetricObservation};
use vigil_records::RecordStore;

use crate::error::{WorkerError, WorkerResult};
use crate::inflight::InFlightJobs;
use crate::job_manager::{JobManager, JobReport};
use crate::metrics::names;

/// How a delivered media unit was handled.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Another task already owns this media unit or its job.
    Skipped,
    /// The media could not be decoded; alerted, nothing submitted.
    DecodeFailed,
    /// The job reached a terminal state.
    Finished(JobReport),
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineOutcome::Skipped => "skipped",
            PipelineOutcome::DecodeFailed => "decode_failed",
            PipelineOutcome::Finished(report) => report.state().as_str(),
        }
    }
}

/// Runs each ingested media unit through the detection chain.
pub struct Pipeline {
    sampler: FrameSampler,
    store: Arc<dyn RecordStore>,
    jobs: JobManager,
    alerts: Arc<dyn AlertSink>,
    inflight: InFlightJobs,
    interval: Duration,
}

impl Pipeline {
    pub fn new(
        sampler: FrameSampler,
        store: Arc<dyn RecordStore>,
        jobs: JobManager,
        alerts: Arc<dyn AlertSink>,
        interval: Duration,
    ) -> Self {
        Self {
            sampler,
            store,
            jobs,
            alerts,
            inflight: InFlightJobs::new(),
            interval,
        }
    }

    pub fn inflight(&self) -> &InFlightJobs {
        &self.inflight
    }

    /// Handle one media unit end to end.
    ///
    /// Errors are infrastructure failures worth redelivering; everything the
    /// media unit itself causes is reported through the outcome.
    pub async fn handle(&self, media: &MediaUnit) -> WorkerResult<PipelineOutcome> {
        media
            .validate()
            .map_err(|e| WorkerError::InvalidMedia(e.to_string()))?;

        let Some(mut claim) = self.inflight.claim(&media.id) else {
            info!(media_id = %media.id, "Media unit already in flight, skipping");
            return Ok(self.finish(PipelineOutcome::Skipped));
        };

        self.store.put_media(media).await?;

        let samples = match self.sampler.sample(media, self.interval).await {
            Ok(samples) => samples,
            Err(e) => return Ok(self.decode_failed(media, e.to_string())),
        };
        let frames = samples.collect().await;
        if frames.is_empty() {
            return Ok(self.decode_failed(
                media,
                format!("none of {} sampled frames could be decoded", samples.len()),
            ));
        }
        if samples.skipped() > 0 {
            warn!(
                media_id = %media.id,
                skipped = samples.skipped(),
                kept = frames.len(),
                "Some frames could not be decoded"
            );
        }

        let job = self.jobs.submit(media, &frames).await;
        // Frames are not needed once submitted
        drop(frames);

        if let Some(job_id) = &job.job_id {
            if !claim.bind_job(job_id) {
                warn!(media_id = %media.id, job_id = %job_id, "Job already tracked by another task");
                return Ok(self.finish(PipelineOutcome::Skipped));
            }
        }

        let report = self.jobs.track(job, media).await;
        Ok(self.finish(PipelineOutcome::Finished(report)))
    }

    fn decode_failed(&self, media: &MediaUnit, reason: String) -> PipelineOutcome {
        warn!(media_id = %media.id, camera_id = %media.camera_id, reason = %reason, "Media decode failed");
        self.alerts.alert(AlertEvent::for_media(
            AlertKind::DecodeFailed,
            media.id.clone(),
            reason,
        ));
        self.finish(PipelineOutcome::DecodeFailed)
    }

    fn finish(&self, outcome: PipelineOutcome) -> PipelineOutcome {
        self.alerts.observe(
            MetricObservation::count(names::MEDIA_HANDLED).with_label("outcome", outcome.as_str()),
        );
        outcome
    }
}
