//! End-to-end pipeline: sample, detect, index, then query.

mod common;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use vigil_media::FrameSampler;
use vigil_models::{AlertKind, JobState, MediaId, MediaUnit, QueryCriteria, StorageRef, TimeRange};
use vigil_records::{
    IndexerConfig, InMemoryRecordStore, QueryConfig, QueryEngine, QueryError, ResultIndexer,
};
use vigil_worker::metrics::names;
use vigil_worker::{JobManager, Pipeline, PipelineOutcome, WorkerError};

use common::{fast_policy, small_frames, FakeBackend, FakeBlobStore, FakeSource, Poll, RecordingSink};

struct World {
    backend: Arc<FakeBackend>,
    store: Arc<InMemoryRecordStore>,
    sink: Arc<RecordingSink>,
    pipeline: Pipeline,
    engine: QueryEngine,
}

fn world(source: FakeSource, backend: FakeBackend) -> World {
    let backend = Arc::new(backend);
    let blobs = Arc::new(FakeBlobStore::new());
    let store = Arc::new(InMemoryRecordStore::new());
    let sink = Arc::new(RecordingSink::default());

    let indexer = Arc::new(ResultIndexer::new(store.clone(), IndexerConfig::default()));
    let jobs = JobManager::new(
        backend.clone(),
        blobs.clone(),
        indexer,
        sink.clone(),
        fast_policy(),
    );
    let sampler = FrameSampler::new(Arc::new(source), small_frames());
    let pipeline = Pipeline::new(
        sampler,
        store.clone(),
        jobs,
        sink.clone(),
        Duration::from_secs(2),
    );
    let engine = QueryEngine::new(store.clone(), blobs, sink.clone(), QueryConfig::default());

    World {
        backend,
        store,
        sink,
        pipeline,
        engine,
    }
}

fn media() -> MediaUnit {
    MediaUnit::new("cam-1", "Lobby", StorageRef::new("lobby/clip.mp4"))
        .with_id(MediaId::from_string("clip"))
        .with_ingested_at(Utc.timestamp_opt(0, 0).unwrap())
}

fn person_backend() -> FakeBackend {
    FakeBackend::new()
        .with_polls([Poll::Progress, Poll::Done])
        .with_detection("person", 0.95, Duration::from_secs(3))
}

#[tokio::test(start_paused = true)]
async fn test_detected_person_is_queryable() {
    let w = world(FakeSource::with_duration(Duration::from_secs(10)), person_backend());
    let media = media();

    let outcome = w.pipeline.handle(&media).await.unwrap();
    let PipelineOutcome::Finished(report) = outcome else {
        panic!("expected a finished job, got {:?}", outcome);
    };
    assert_eq!(report.state(), JobState::Succeeded);
    assert_eq!(report.records.len(), 1);
    // 0, 2, 4, 6, 8 and 10 seconds
    assert_eq!(w.backend.frames(), 6);
    assert_eq!(w.store.record_count().await, 1);

    let epoch = Utc.timestamp_opt(0, 0).unwrap();
    let criteria = QueryCriteria::new()
        .with_object_type("Person")
        .with_time_range(TimeRange::between(epoch, epoch + ChronoDuration::seconds(5)));
    let hits = w.engine.query(&criteria).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].media_id, media.id);
    assert_eq!(hits[0].first_detected_at, epoch + ChronoDuration::seconds(3));
    assert_eq!(hits[0].labels, vec!["person".to_string()]);
    assert_eq!(hits[0].handle.target, media.storage_ref);
    assert!(hits[0].handle.expires_at > Utc::now());

    let unmatched = QueryCriteria::new().with_object_type("car");
    assert!(matches!(
        w.engine.query(&unmatched).await,
        Err(QueryError::NotFound)
    ));
    assert!(matches!(
        w.engine.query(&QueryCriteria::new()).await,
        Err(QueryError::InvalidQuery(_))
    ));
    assert!(w.sink.alerts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_media_alerts_without_submitting() {
    let w = world(FakeSource::corrupt(), person_backend());

    let outcome = w.pipeline.handle(&media()).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::DecodeFailed));
    assert_eq!(w.sink.alert_kinds(), vec![AlertKind::DecodeFailed]);
    assert_eq!(w.backend.submits(), 0);
    let handled = w.sink.observations(names::MEDIA_HANDLED);
    assert_eq!(
        handled[0].labels,
        vec![("outcome".to_string(), "decode_failed".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_invalid_media_is_rejected_permanently() {
    let w = world(FakeSource::with_duration(Duration::from_secs(4)), person_backend());
    let mut bad = media();
    bad.camera_id = String::new();

    let err = w.pipeline.handle(&bad).await.unwrap_err();

    assert!(matches!(err, WorkerError::InvalidMedia(_)));
    assert!(!err.is_retryable());
    assert_eq!(w.backend.submits(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_delivery_of_same_media_is_skipped() {
    let w = world(FakeSource::with_duration(Duration::from_secs(4)), person_backend());
    let media = media();

    let (first, second) = tokio::join!(w.pipeline.handle(&media), w.pipeline.handle(&media));

    assert!(matches!(first.unwrap(), PipelineOutcome::Finished(_)));
    assert!(matches!(second.unwrap(), PipelineOutcome::Skipped));
    assert_eq!(w.backend.submits(), 1);
    assert!(w.pipeline.inflight().is_empty());
}
