//! Structured job logging utilities.
//!
//! Provides consistent lifecycle logging for one media unit's detection job,
//! carrying the media id, camera id and (once assigned) the backend job id.

use tracing::{error, info, warn, Span};

use vigil_models::{JobId, MediaUnit};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    media_id: String,
    camera_id: String,
    job_id: String,
}

impl JobLogger {
    pub fn new(media: &MediaUnit) -> Self {
        Self {
            media_id: media.id.to_string(),
            camera_id: media.camera_id.clone(),
            job_id: String::new(),
        }
    }

    /// Attach the backend job id once the submission is accepted.
    pub fn with_job(mut self, job_id: &JobId) -> Self {
        self.job_id = job_id.to_string();
        self
    }

    pub fn log_start(&self, message: &str) {
        info!(
            media_id = %self.media_id,
            camera_id = %self.camera_id,
            job_id = %self.job_id,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            media_id = %self.media_id,
            job_id = %self.job_id,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            media_id = %self.media_id,
            job_id = %self.job_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            media_id = %self.media_id,
            camera_id = %self.camera_id,
            job_id = %self.job_id,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            media_id = %self.media_id,
            job_id = %self.job_id,
            "Job completed: {}", message
        );
    }

    pub fn media_id(&self) -> &str {
        &self.media_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "detection_job",
            media_id = %self.media_id,
            camera_id = %self.camera_id,
        )
    }
}
