//! Media ingestion handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use vigil_models::{MediaId, MediaUnit, Resolution, StorageRef};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_ingest;
use crate::state::AppState;

/// Body of `POST /api/media`: a stored segment ready for detection.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Caller-chosen id; generated when absent
    pub media_id: Option<String>,
    pub camera_id: String,
    pub location: String,
    pub storage_ref: String,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<f64>,
    pub format: Option<String>,
    /// Start of capture; defaults to now
    pub ingested_at: Option<DateTime<Utc>>,
}

impl IngestRequest {
    pub fn into_media(self) -> MediaUnit {
        let mut media = MediaUnit::new(
            self.camera_id,
            self.location,
            StorageRef::new(self.storage_ref),
        );
        if let Some(id) = self.media_id {
            media = media.with_id(MediaId::from_string(id));
        }
        if let Some(resolution) = self.resolution {
            media = media.with_resolution(resolution);
        }
        if let Some(frame_rate) = self.frame_rate {
            media = media.with_frame_rate(frame_rate);
        }
        if let Some(format) = self.format {
            media = media.with_format(format);
        }
        if let Some(ingested_at) = self.ingested_at {
            media = media.with_ingested_at(ingested_at);
        }
        media
    }
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub media_id: MediaId,
    pub message_id: String,
}

/// `POST /api/media`
pub async fn ingest_media(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let media = request.into_media();
    if let Err(e) = media.validate() {
        record_ingest("invalid");
        return Err(ApiError::validation(e.to_string()));
    }

    let message_id = match state.ingest.submit(&media).await {
        Ok(id) => id,
        Err(e) => {
            let err = ApiError::from(e);
            record_ingest(if matches!(err, ApiError::Conflict(_)) {
                "duplicate"
            } else {
                "error"
            });
            return Err(err);
        }
    };

    record_ingest("enqueued");
    info!(
        media_id = %media.id,
        camera_id = %media.camera_id,
        message_id = %message_id,
        "Media unit accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            media_id: media.id,
            message_id,
        }),
    ))
}
