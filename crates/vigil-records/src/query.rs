//! Query engine: filters committed records and issues access handles.

use futures_util::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use vigil_models::{
    AlertEvent, AlertSink, DetectionRecord, MediaId, MetricObservation, QueryCriteria, QueryHit,
};
use vigil_storage::{BlobStore, DEFAULT_ACCESS_HANDLE_TTL, MAX_ACCESS_HANDLE_TTL};

use crate::error::QueryError;
use crate::metrics::{names, record_query};
use crate::store::RecordStore;

/// Query engine configuration.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Lifetime of issued access handles
    pub handle_ttl: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            handle_ttl: DEFAULT_ACCESS_HANDLE_TTL,
        }
    }
}

impl QueryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let handle_ttl = std::env::var("ACCESS_HANDLE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ACCESS_HANDLE_TTL);
        Self {
            handle_ttl: handle_ttl.min(MAX_ACCESS_HANDLE_TTL),
        }
    }
}

/// Matching records for one media unit, in first-match order.
struct MediaMatch {
    media_id: MediaId,
    first: DetectionRecord,
    labels: Vec<String>,
}

/// Read-only query front for the record store.
pub struct QueryEngine {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    alerts: Arc<dyn AlertSink>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        alerts: Arc<dyn AlertSink>,
        config: QueryConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            alerts,
            config,
        }
    }

    /// Run a conjunctive query.
    ///
    /// Returns one hit per distinct media unit, ordered by each unit's
    /// earliest matching detection (ties by record id). Every hit carries a
    /// freshly generated access handle.
    pub async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<QueryHit>, QueryError> {
        let started = Instant::now();
        let result = self.run(criteria).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(QueryError::InvalidQuery(_)) => "invalid",
            Err(QueryError::NotFound) => "not_found",
            Err(QueryError::BackendUnavailable(_)) => "unavailable",
        };
        record_query(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, criteria: &QueryCriteria) -> Result<Vec<QueryHit>, QueryError> {
        let criteria = criteria.normalized()?;

        let mut records = self
            .store
            .scan(&criteria)
            .await
            .map_err(|e| self.unavailable("record store scan failed", e))?;
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        debug!(matches = records.len(), "Scanned detection records");

        let matches = group_by_media(records);
        if matches.is_empty() {
            return Err(QueryError::NotFound);
        }

        let mut resolved = Vec::with_capacity(matches.len());
        for m in matches {
            let media = self
                .store
                .get_media(&m.media_id)
                .await
                .map_err(|e| self.unavailable("media lookup failed", e))?;
            match media {
                Some(media) => resolved.push((m, media)),
                None => warn!(media_id = %m.media_id, "Skipping records for unregistered media"),
            }
        }
        if resolved.is_empty() {
            return Err(QueryError::NotFound);
        }

        let handles = try_join_all(resolved.iter().map(|(_, media)| {
            self.blobs
                .generate_access_handle(&media.storage_ref, self.config.handle_ttl)
        }))
        .await
        .map_err(|e| self.unavailable("access handle generation failed", e))?;

        Ok(resolved
            .into_iter()
            .zip(handles)
            .map(|((m, media), handle)| QueryHit {
                media_id: media.id,
                storage_ref: media.storage_ref,
                camera_id: media.camera_id,
                location: media.location,
                first_detected_at: m.first.detected_at,
                labels: m.labels,
                handle,
            })
            .collect())
    }

    /// Surface a backend failure once: alert, count, convert.
    fn unavailable(&self, context: &str, cause: impl std::fmt::Display) -> QueryError {
        let reason = format!("{}: {}", context, cause);
        error!(reason = %reason, "Query backend unavailable");
        self.alerts.alert(AlertEvent::for_query(reason.clone()));
        self.alerts
            .observe(MetricObservation::count(names::QUERY_BACKEND_FAILURES));
        QueryError::backend_unavailable(reason)
    }
}

/// Collapse ordered records into one entry per media, preserving order.
fn group_by_media(records: Vec<DetectionRecord>) -> Vec<MediaMatch> {
    let mut order: Vec<MediaMatch> = Vec::new();
    let mut positions: HashMap<MediaId, usize> = HashMap::new();

    for record in records {
        match positions.get(&record.media_id) {
            Some(&pos) => {
                let entry = &mut order[pos];
                if !entry.labels.contains(&record.label) {
                    entry.labels.push(record.label.clone());
                }
            }
            None => {
                positions.insert(record.media_id.clone(), order.len());
                order.push(MediaMatch {
                    media_id: record.media_id.clone(),
                    labels: vec![record.label.clone()],
                    first: record,
                });
            }
        }
    }
    order
}
