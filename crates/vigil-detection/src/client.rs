//! Detection service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use vigil_models::{FrameSample, JobId, MediaUnit};

use crate::backend::DetectionBackend;
use crate::error::{DetectionError, DetectionResult};
use crate::types::{
    FetchResponse, HealthResponse, PollResponse, PollStatus, RawDetection, RemoteStatus,
    ResultHandle, SubmitMedia, SubmitResponse,
};

/// Configuration for the detection client.
#[derive(Debug, Clone)]
pub struct DetectionClientConfig {
    /// Base URL of the detection service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for DetectionClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl DetectionClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DETECTION_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("DETECTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
        }
    }
}

/// HTTP client for the detection service.
pub struct HttpDetectionClient {
    http: Client,
    base_url: Url,
}

impl HttpDetectionClient {
    /// Create a new client.
    pub fn new(config: DetectionClientConfig) -> DetectionResult<Self> {
        let mut base_url = Url::parse(&config.base_url)
            .map_err(|e| DetectionError::Config(format!("{}: {}", config.base_url, e)))?;
        // Url::join drops the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DetectionError::Network)?;

        Ok(Self { http, base_url })
    }

    /// Create from environment variables.
    pub fn from_env() -> DetectionResult<Self> {
        Self::new(DetectionClientConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> DetectionResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DetectionError::Config(format!("bad endpoint {}: {}", path, e)))
    }

    /// `{collection}/{id}` with `id` pushed as a single percent-encoded
    /// segment, so ids handed out by the backend cannot change the target.
    fn resource(&self, collection: &str, id: &str) -> DetectionResult<Url> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(DetectionError::invalid_response(format!(
                "unusable {} id {:?}",
                collection, id
            )));
        }
        let mut url = self.endpoint(collection)?;
        url.path_segments_mut()
            .map_err(|_| DetectionError::Config(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Check if the detection service is healthy.
    pub async fn health_check(&self) -> DetectionResult<bool> {
        let url = self.endpoint("health")?;

        match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Detection service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Detection service health check error: {}", e);
                Ok(false)
            }
        }
    }

    fn build_form(media: &MediaUnit, frames: &[FrameSample]) -> DetectionResult<Form> {
        let descriptor = serde_json::to_string(&SubmitMedia::from(media))?;
        let mut form = Form::new().part(
            "media",
            Part::text(descriptor).mime_str("application/json")?,
        );
        for frame in frames {
            let part = Part::bytes(frame.payload.clone())
                .file_name(format!("{}.jpg", frame.offset_ms()))
                .mime_str("image/jpeg")?;
            form = form.part(format!("frame-{}", frame.sequence), part);
        }
        Ok(form)
    }
}

/// Map a non-success response to an error kind.
async fn error_for_status(response: Response) -> DetectionError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = format!("detection service returned {}: {}", status, body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => DetectionError::Throttled(message),
        StatusCode::NOT_FOUND | StatusCode::GONE => DetectionError::Gone(message),
        s if s.is_server_error() => DetectionError::Unavailable(message),
        _ => DetectionError::Rejected(message),
    }
}

#[async_trait]
impl DetectionBackend for HttpDetectionClient {
    async fn submit(&self, media: &MediaUnit, frames: &[FrameSample]) -> DetectionResult<JobId> {
        if frames.is_empty() {
            return Err(DetectionError::rejected("no frames to submit"));
        }
        let url = self.endpoint("jobs")?;
        debug!(media_id = %media.id, frames = frames.len(), "Submitting detection job");

        let form = Self::build_form(media, frames)?;
        let response = self.http.post(url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let submitted: SubmitResponse = response.json().await?;
        if submitted.job_id.trim().is_empty() {
            return Err(DetectionError::invalid_response("empty job_id"));
        }
        Ok(JobId::from_string(submitted.job_id))
    }

    async fn poll(&self, job_id: &JobId) -> DetectionResult<PollStatus> {
        let url = self.resource("jobs", job_id.as_str())?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let poll: PollResponse = response.json().await?;
        match poll.status {
            RemoteStatus::InProgress => Ok(PollStatus::InProgress),
            RemoteStatus::Succeeded => {
                let result = poll.result.ok_or_else(|| {
                    DetectionError::invalid_response("succeeded job without result handle")
                })?;
                Ok(PollStatus::Succeeded {
                    result: ResultHandle::new(result),
                })
            }
            RemoteStatus::Failed => Ok(PollStatus::Failed {
                reason: poll
                    .reason
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            }),
        }
    }

    async fn fetch(&self, result: &ResultHandle) -> DetectionResult<Vec<RawDetection>> {
        let url = self.resource("results", result.as_str())?;

        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let fetched: FetchResponse = response.json().await?;
        Ok(fetched.detections)
    }
}
