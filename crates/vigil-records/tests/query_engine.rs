//! Query engine behaviour against the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_models::{
    AccessHandle, AlertEvent, AlertKind, AlertSink, Detection, DetectionJob, DetectionRecord,
    JobId, JobState, MediaId, MediaUnit, MetricObservation, QueryCriteria, StorageRef, TimeRange,
};
use vigil_records::{
    IndexerConfig, InMemoryRecordStore, QueryConfig, QueryEngine, QueryError, RecordError,
    RecordResult, RecordStore, ResultIndexer,
};
use vigil_records::store::BatchOutcome;
use vigil_storage::{BlobStore, StorageError, StorageResult};

struct FakeBlobStore {
    issued: AtomicUsize,
    fail: bool,
}

impl FakeBlobStore {
    fn new() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            issued: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn generate_access_handle(
        &self,
        target: &StorageRef,
        ttl: Duration,
    ) -> StorageResult<AccessHandle> {
        if self.fail {
            return Err(StorageError::AwsSdk("connection refused".to_string()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(AccessHandle {
            target: target.clone(),
            url: format!("https://blobs.test/{}?sig={}", target, n),
            expires_at: Utc::now() + ChronoDuration::from_std(ttl).unwrap(),
        })
    }

    async fn exists(&self, _target: &StorageRef) -> StorageResult<bool> {
        Ok(true)
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<AlertEvent>>,
    observations: Mutex<Vec<MetricObservation>>,
}

impl AlertSink for RecordingSink {
    fn alert(&self, event: AlertEvent) {
        self.alerts.lock().unwrap().push(event);
    }

    fn observe(&self, observation: MetricObservation) {
        self.observations.lock().unwrap().push(observation);
    }
}

/// Store whose every call fails as if Redis were down.
struct DownStore;

#[async_trait]
impl RecordStore for DownStore {
    async fn put_media(&self, _media: &MediaUnit) -> RecordResult<()> {
        Err(RecordError::unavailable("down"))
    }
    async fn get_media(&self, _id: &MediaId) -> RecordResult<Option<MediaUnit>> {
        Err(RecordError::unavailable("down"))
    }
    async fn write_batch(
        &self,
        _job_id: &JobId,
        _records: Vec<DetectionRecord>,
    ) -> RecordResult<BatchOutcome> {
        Err(RecordError::unavailable("down"))
    }
    async fn scan(&self, _criteria: &QueryCriteria) -> RecordResult<Vec<DetectionRecord>> {
        Err(RecordError::unavailable("down"))
    }
    async fn records_for_job(&self, _job_id: &JobId) -> RecordResult<Option<Vec<DetectionRecord>>> {
        Err(RecordError::unavailable("down"))
    }
    async fn ping(&self) -> RecordResult<()> {
        Err(RecordError::unavailable("down"))
    }
}

fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn media(id: &str, camera: &str, ingested: i64) -> MediaUnit {
    MediaUnit::new(camera, "Loading dock", StorageRef::new(format!("{}/{}.mp4", camera, id)))
        .with_id(MediaId::from_string(id))
        .with_ingested_at(epoch(ingested))
}

async fn commit(
    store: &Arc<InMemoryRecordStore>,
    media: &MediaUnit,
    job_id: &str,
    detections: &[(&str, u64)],
) {
    store.put_media(media).await.unwrap();
    let indexer = ResultIndexer::new(store.clone(), IndexerConfig::default());
    let mut job = DetectionJob::new(media.id.clone());
    job.mark_submitted(JobId::from_string(job_id)).unwrap();
    job.transition(JobState::Succeeded).unwrap();
    let detections: Vec<Detection> = detections
        .iter()
        .map(|(label, secs)| Detection::normalize(label, 0.92, Duration::from_secs(*secs)).unwrap())
        .collect();
    indexer.commit(&job, &detections).await.unwrap();
}

fn engine(
    store: Arc<dyn RecordStore>,
    blobs: Arc<FakeBlobStore>,
    sink: Arc<RecordingSink>,
) -> QueryEngine {
    QueryEngine::new(store, blobs, sink, QueryConfig::default())
}

#[tokio::test]
async fn test_query_returns_one_hit_per_media_in_detection_order() {
    let store = Arc::new(InMemoryRecordStore::new());
    commit(&store, &media("m-late", "cam-1", 100), "j-1", &[("person", 5), ("person", 6)]).await;
    commit(&store, &media("m-early", "cam-2", 0), "j-2", &[("car", 1), ("person", 3)]).await;

    let blobs = Arc::new(FakeBlobStore::new());
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store, blobs.clone(), sink.clone());

    let hits = engine
        .query(&QueryCriteria::new().with_object_type("Person"))
        .await
        .unwrap();

    let ids: Vec<&str> = hits.iter().map(|h| h.media_id.as_str()).collect();
    assert_eq!(ids, vec!["m-early", "m-late"]);
    assert_eq!(hits[0].first_detected_at, epoch(3));
    assert_eq!(hits[0].labels, vec!["person"]);
    assert_eq!(hits[1].camera_id, "cam-1");
    assert_eq!(hits[1].handle.target.as_str(), "cam-1/m-late.mp4");
    assert_eq!(blobs.issued.load(Ordering::SeqCst), 2);
    assert!(sink.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_queries_issue_fresh_handles() {
    let store = Arc::new(InMemoryRecordStore::new());
    commit(&store, &media("m-1", "cam-1", 0), "j-1", &[("person", 2)]).await;
    let blobs = Arc::new(FakeBlobStore::new());
    let engine = engine(store, blobs.clone(), Arc::new(RecordingSink::default()));

    let criteria = QueryCriteria::new().with_camera("cam-1");
    let first = engine.query(&criteria).await.unwrap();
    let second = engine.query(&criteria).await.unwrap();
    assert_ne!(first[0].handle.url, second[0].handle.url);
    assert_eq!(blobs.issued.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_conjunctive_filters_and_inclusive_range() {
    let store = Arc::new(InMemoryRecordStore::new());
    commit(&store, &media("m-1", "cam-1", 0), "j-1", &[("person", 5)]).await;
    commit(&store, &media("m-2", "cam-2", 0), "j-2", &[("person", 5)]).await;
    let engine = engine(
        store,
        Arc::new(FakeBlobStore::new()),
        Arc::new(RecordingSink::default()),
    );

    let hits = engine
        .query(
            &QueryCriteria::new()
                .with_camera("cam-2")
                .with_object_type("person")
                .with_time_range(TimeRange::between(epoch(0), epoch(5))),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].media_id.as_str(), "m-2");

    let outside = engine
        .query(
            &QueryCriteria::new()
                .with_object_type("person")
                .with_time_range(TimeRange::between(epoch(6), epoch(60))),
        )
        .await;
    assert!(matches!(outside, Err(QueryError::NotFound)));
}

#[tokio::test]
async fn test_invalid_and_empty_queries() {
    let store = Arc::new(InMemoryRecordStore::new());
    commit(&store, &media("m-1", "cam-1", 0), "j-1", &[("person", 1)]).await;
    let engine = engine(
        store,
        Arc::new(FakeBlobStore::new()),
        Arc::new(RecordingSink::default()),
    );

    assert!(matches!(
        engine.query(&QueryCriteria::new()).await,
        Err(QueryError::InvalidQuery(_))
    ));
    assert!(matches!(
        engine
            .query(&QueryCriteria::new().with_time_range(TimeRange::between(epoch(9), epoch(1))))
            .await,
        Err(QueryError::InvalidQuery(_))
    ));
    assert!(matches!(
        engine.query(&QueryCriteria::new().with_object_type("car")).await,
        Err(QueryError::NotFound)
    ));
}

#[tokio::test]
async fn test_unreachable_store_alerts_once() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(Arc::new(DownStore), Arc::new(FakeBlobStore::new()), sink.clone());

    let result = engine.query(&QueryCriteria::new().with_camera("cam-1")).await;
    assert!(matches!(result, Err(QueryError::BackendUnavailable(_))));

    let alerts = sink.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::QueryBackendUnavailable);
    assert_eq!(
        sink.observations.lock().unwrap()[0].name,
        "vigil_query_backend_failures_total"
    );
}

#[tokio::test]
async fn test_unreachable_blob_store_is_backend_unavailable() {
    let store = Arc::new(InMemoryRecordStore::new());
    commit(&store, &media("m-1", "cam-1", 0), "j-1", &[("person", 1)]).await;
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(store, Arc::new(FakeBlobStore::failing()), sink.clone());

    let result = engine.query(&QueryCriteria::new().with_object_type("person")).await;
    assert!(matches!(result, Err(QueryError::BackendUnavailable(_))));
    assert_eq!(sink.alerts.lock().unwrap().len(), 1);
}

/// Records for one multi-detection job, each with its own label.
fn job_batch(job_id: &JobId, media: &MediaUnit, size: usize) -> Vec<DetectionRecord> {
    (0..size)
        .map(|i| {
            let d = Detection::normalize(&format!("obj-{}", i), 0.9, Duration::from_secs(i as u64))
                .unwrap();
            DetectionRecord::derive(job_id, i, media, &d).unwrap()
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_observe_partial_batches() {
    const JOBS: usize = 40;
    const BATCH: usize = 8;

    let store = Arc::new(InMemoryRecordStore::new());
    let medias: Vec<MediaUnit> = (0..JOBS)
        .map(|j| media(&format!("seg-{}", j), "cam-race", j as i64 * 100))
        .collect();
    for m in &medias {
        store.put_media(m).await.unwrap();
    }
    let engine = Arc::new(engine(
        store.clone(),
        Arc::new(FakeBlobStore::new()),
        Arc::new(RecordingSink::default()),
    ));
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..3 {
        let store = store.clone();
        let engine = engine.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let criteria = QueryCriteria::new().with_camera("cam-race");
            let mut reads = 0usize;
            while !done.load(Ordering::SeqCst) || reads == 0 {
                let records = store.scan(&criteria).await.unwrap();
                let mut per_job: std::collections::HashMap<JobId, usize> = Default::default();
                for record in &records {
                    *per_job.entry(record.job_id.clone()).or_default() += 1;
                }
                assert!(
                    per_job.values().all(|n| *n == BATCH),
                    "scan saw a partial job: {:?}",
                    per_job
                );

                match engine.query(&criteria).await {
                    Ok(hits) => assert!(hits.iter().all(|hit| hit.labels.len() == BATCH)),
                    Err(QueryError::NotFound) => {}
                    Err(e) => panic!("unexpected query error: {}", e),
                }
                reads += 1;
                tokio::task::yield_now().await;
            }
            reads
        }));
    }

    for (j, m) in medias.iter().enumerate() {
        let job_id = JobId::from_string(format!("race-{}", j));
        store
            .write_batch(&job_id, job_batch(&job_id, m, BATCH))
            .await
            .unwrap();
        tokio::task::yield_now().await;
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    assert_eq!(store.record_count().await, JOBS * BATCH);
}
