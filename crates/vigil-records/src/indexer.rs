//! Result indexer: turns a succeeded job's detections into committed records.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use vigil_models::{Detection, DetectionJob, DetectionRecord, JobState};

use crate::error::IndexWriteError;
use crate::metrics::record_commit;
use crate::store::{BatchOutcome, RecordStore};

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Detections below this confidence are not indexed
    pub min_confidence: f32,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.8,
        }
    }
}

impl IndexerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            min_confidence: std::env::var("MIN_CONFIDENCE")
                .ok()
                .and_then(|s| s.parse::<f32>().ok())
                .filter(|c| (0.0..=1.0).contains(c))
                .unwrap_or(0.8),
        }
    }
}

/// Writes detection records for completed jobs.
pub struct ResultIndexer {
    store: Arc<dyn RecordStore>,
    config: IndexerConfig,
}

impl ResultIndexer {
    pub fn new(store: Arc<dyn RecordStore>, config: IndexerConfig) -> Self {
        Self { store, config }
    }

    /// Commit all records for `job` as one atomic batch.
    ///
    /// The backend job id is the dedup key: committing the same job again
    /// returns the set stored by the first commit and writes nothing.
    pub async fn commit(
        &self,
        job: &DetectionJob,
        detections: &[Detection],
    ) -> Result<Vec<DetectionRecord>, IndexWriteError> {
        if job.state != JobState::Succeeded {
            return Err(IndexWriteError::JobNotSucceeded {
                media_id: job.media_id.clone(),
                state: job.state,
            });
        }
        let job_id = job
            .job_id
            .as_ref()
            .ok_or_else(|| IndexWriteError::MissingJobId(job.media_id.clone()))?;

        let started = Instant::now();
        let media = self
            .store
            .get_media(&job.media_id)
            .await
            .map_err(|e| {
                record_commit("error", 0, started.elapsed().as_secs_f64());
                IndexWriteError::Store(e)
            })?
            .ok_or_else(|| IndexWriteError::MediaNotRegistered(job.media_id.clone()))?;

        let records: Vec<DetectionRecord> = detections
            .iter()
            .filter(|d| d.confidence >= self.config.min_confidence)
            .enumerate()
            .filter_map(|(index, detection)| {
                let record = DetectionRecord::derive(job_id, index, &media, detection);
                if record.is_none() {
                    warn!(
                        job_id = %job_id,
                        media_id = %media.id,
                        label = %detection.label,
                        offset_ms = detection.offset_ms,
                        "Dropping detection with out-of-range offset"
                    );
                }
                record
            })
            .collect();
        debug!(
            job_id = %job_id,
            media_id = %media.id,
            detections = detections.len(),
            kept = records.len(),
            "Indexing detections"
        );

        let outcome = match self.store.write_batch(job_id, records).await {
            Ok(outcome) => outcome,
            Err(e) => {
                record_commit("error", 0, started.elapsed().as_secs_f64());
                return Err(IndexWriteError::Store(e));
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &outcome {
            BatchOutcome::Written(records) => {
                record_commit("written", records.len(), elapsed);
                info!(
                    job_id = %job_id,
                    media_id = %media.id,
                    records = records.len(),
                    "Committed detection records"
                );
            }
            BatchOutcome::AlreadyCommitted(records) => {
                record_commit("duplicate", 0, elapsed);
                info!(
                    job_id = %job_id,
                    media_id = %media.id,
                    records = records.len(),
                    "Job already committed, returning stored records"
                );
            }
        }

        Ok(outcome.into_records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRecordStore;
    use std::time::Duration;
    use vigil_models::{JobId, MediaUnit, StorageRef};

    fn succeeded_job(media: &MediaUnit, job_id: &str) -> DetectionJob {
        let mut job = DetectionJob::new(media.id.clone());
        job.mark_submitted(JobId::from_string(job_id)).unwrap();
        job.transition(JobState::Succeeded).unwrap();
        job
    }

    fn detection(label: &str, confidence: f32, secs: u64) -> Detection {
        Detection::normalize(label, confidence, Duration::from_secs(secs)).unwrap()
    }

    async fn setup() -> (Arc<InMemoryRecordStore>, ResultIndexer, MediaUnit) {
        let store = Arc::new(InMemoryRecordStore::new());
        let media = MediaUnit::new("cam-1", "Gate", StorageRef::new("cam-1/a.mp4"));
        store.put_media(&media).await.unwrap();
        let indexer = ResultIndexer::new(store.clone(), IndexerConfig::default());
        (store, indexer, media)
    }

    #[tokio::test]
    async fn test_commit_filters_low_confidence() {
        let (_store, indexer, media) = setup().await;
        let job = succeeded_job(&media, "job-1");
        let records = indexer
            .commit(
                &job,
                &[detection("person", 0.95, 3), detection("car", 0.5, 4), detection("dog", 0.8, 5)],
            )
            .await
            .unwrap();
        let labels: Vec<&str> = records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "dog"]);
        assert!(records.iter().all(|r| r.job_id.as_str() == "job-1"));
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let (store, indexer, media) = setup().await;
        let job = succeeded_job(&media, "job-1");
        let detections = [detection("person", 0.95, 3)];

        let first = indexer.commit(&job, &detections).await.unwrap();
        let second = indexer.commit(&job, &detections).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_empty_result_still_marks_job() {
        let (store, indexer, media) = setup().await;
        let job = succeeded_job(&media, "job-empty");
        let records = indexer.commit(&job, &[detection("car", 0.1, 1)]).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(
            store
                .records_for_job(&JobId::from_string("job-empty"))
                .await
                .unwrap(),
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_refuses_unsucceeded_jobs_and_unknown_media() {
        let (_store, indexer, media) = setup().await;

        let mut polling = DetectionJob::new(media.id.clone());
        polling.mark_submitted(JobId::from_string("job-2")).unwrap();
        polling.transition(JobState::Polling).unwrap();
        assert!(matches!(
            indexer.commit(&polling, &[]).await,
            Err(IndexWriteError::JobNotSucceeded { .. })
        ));

        let stranger = MediaUnit::new("cam-2", "Roof", StorageRef::new("cam-2/a.mp4"));
        let job = succeeded_job(&stranger, "job-3");
        assert!(matches!(
            indexer.commit(&job, &[]).await,
            Err(IndexWriteError::MediaNotRegistered(_))
        ));
    }
}
