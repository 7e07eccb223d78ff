//! In-memory record store engine.
//!
//! All state sits behind a single `RwLock`, so a batch write is visible to
//! scans either completely or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;

use vigil_models::{DetectionRecord, JobId, MediaId, MediaUnit, QueryCriteria, RecordId};

use crate::error::RecordResult;
use crate::store::{BatchOutcome, RecordStore};

type TimeKey = (DateTime<Utc>, RecordId);

#[derive(Default)]
struct Tables {
    media: HashMap<MediaId, MediaUnit>,
    records: HashMap<RecordId, DetectionRecord>,
    /// Commit markers: job id -> record ids, in commit order
    jobs: HashMap<JobId, Vec<RecordId>>,
    by_time: BTreeSet<TimeKey>,
    by_camera: HashMap<String, BTreeSet<TimeKey>>,
    by_label: HashMap<String, BTreeSet<TimeKey>>,
}

impl Tables {
    fn collect(&self, ids: &[RecordId]) -> Vec<DetectionRecord> {
        ids.iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }
}

/// Record store kept in process memory.
#[derive(Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub async fn record_count(&self) -> usize {
        self.tables.read().await.records.len()
    }
}

fn lower_bound(start: Option<DateTime<Utc>>) -> Bound<TimeKey> {
    match start {
        // Empty record id sorts before every real id
        Some(start) => Bound::Included((start, RecordId(String::new()))),
        None => Bound::Unbounded,
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn put_media(&self, media: &MediaUnit) -> RecordResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .media
            .entry(media.id.clone())
            .or_insert_with(|| media.clone());
        Ok(())
    }

    async fn get_media(&self, id: &MediaId) -> RecordResult<Option<MediaUnit>> {
        Ok(self.tables.read().await.media.get(id).cloned())
    }

    async fn write_batch(
        &self,
        job_id: &JobId,
        records: Vec<DetectionRecord>,
    ) -> RecordResult<BatchOutcome> {
        let mut tables = self.tables.write().await;

        if let Some(ids) = tables.jobs.get(job_id) {
            return Ok(BatchOutcome::AlreadyCommitted(tables.collect(ids)));
        }

        let ids: Vec<RecordId> = records.iter().map(|r| r.record_id.clone()).collect();
        for record in &records {
            let key = (record.detected_at, record.record_id.clone());
            tables.by_time.insert(key.clone());
            tables
                .by_camera
                .entry(record.camera_id.clone())
                .or_default()
                .insert(key.clone());
            tables
                .by_label
                .entry(record.label.clone())
                .or_default()
                .insert(key);
            tables
                .records
                .insert(record.record_id.clone(), record.clone());
        }
        tables.jobs.insert(job_id.clone(), ids);

        Ok(BatchOutcome::Written(records))
    }

    async fn scan(&self, criteria: &QueryCriteria) -> RecordResult<Vec<DetectionRecord>> {
        let tables = self.tables.read().await;

        // Narrowest available index first
        let index = if let Some(camera) = &criteria.camera_id {
            tables.by_camera.get(camera)
        } else if let Some(label) = &criteria.object_type {
            tables.by_label.get(label)
        } else {
            Some(&tables.by_time)
        };
        let Some(index) = index else {
            return Ok(Vec::new());
        };

        let range = criteria.time_range.unwrap_or_default();
        let records = index
            .range((lower_bound(range.start), Bound::Unbounded))
            .take_while(|(at, _)| range.end.map_or(true, |end| *at <= end))
            .filter_map(|(_, id)| tables.records.get(id))
            .filter(|record| criteria.matches(record))
            .cloned()
            .collect();

        Ok(records)
    }

    async fn records_for_job(&self, job_id: &JobId) -> RecordResult<Option<Vec<DetectionRecord>>> {
        let tables = self.tables.read().await;
        Ok(tables.jobs.get(job_id).map(|ids| tables.collect(ids)))
    }

    async fn ping(&self) -> RecordResult<()> {
        Ok(())
    }
}
