//! Detection query handler.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vigil_models::{QueryCriteria, QueryHit, TimeRange};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query string of `GET /api/detections`.
#[derive(Debug, Default, Deserialize)]
pub struct DetectionQuery {
    pub camera_id: Option<String>,
    pub object_type: Option<String>,
    /// RFC 3339 timestamp or Unix seconds
    pub start: Option<String>,
    /// RFC 3339 timestamp or Unix seconds
    pub end: Option<String>,
}

impl DetectionQuery {
    pub fn into_criteria(self) -> ApiResult<QueryCriteria> {
        let start = self.start.as_deref().map(|s| parse_time("start", s)).transpose()?;
        let end = self.end.as_deref().map(|s| parse_time("end", s)).transpose()?;

        Ok(QueryCriteria {
            camera_id: self.camera_id,
            object_type: self.object_type,
            time_range: (start.is_some() || end.is_some()).then_some(TimeRange { start, end }),
        })
    }
}

/// Parse an RFC 3339 timestamp or whole Unix seconds.
pub fn parse_time(field: &str, value: &str) -> ApiResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| {
            ApiError::invalid_query(format!(
                "{} must be an RFC 3339 timestamp or Unix seconds, got {:?}",
                field, value
            ))
        })
}

#[derive(Debug, Serialize)]
pub struct DetectionsResponse {
    pub count: usize,
    pub results: Vec<QueryHit>,
}

/// `GET /api/detections`
pub async fn list_detections(
    State(state): State<AppState>,
    Query(params): Query<DetectionQuery>,
) -> ApiResult<Json<DetectionsResponse>> {
    let criteria = params.into_criteria()?;
    let results = state.engine.query(&criteria).await?;
    debug!(count = results.len(), "Detection query answered");

    Ok(Json(DetectionsResponse {
        count: results.len(),
        results,
    }))
}
