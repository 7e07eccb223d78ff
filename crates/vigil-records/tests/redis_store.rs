//! Redis engine tests. Run with a local Redis:
//! `REDIS_URL=redis://localhost:6379 cargo test -p vigil-records -- --ignored`

use chrono::{TimeZone, Utc};
use std::time::Duration;

use vigil_models::{Detection, DetectionRecord, JobId, MediaId, MediaUnit, QueryCriteria, StorageRef};
use vigil_records::{RecordStore, RedisRecordStore};

fn store() -> RedisRecordStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    RedisRecordStore::new(&url).unwrap()
}

fn unique(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}", prefix, nanos)
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_batch_commit_is_idempotent() {
    let store = store();
    let camera = unique("cam");
    let media = MediaUnit::new(camera.as_str(), "Gate", StorageRef::new("gate/a.mp4"))
        .with_id(MediaId::from_string(unique("media")))
        .with_ingested_at(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    store.put_media(&media).await.unwrap();

    let job_id = JobId::from_string(unique("job"));
    let records: Vec<DetectionRecord> = [("person", 1), ("car", 4)]
        .iter()
        .enumerate()
        .map(|(i, (label, secs))| {
            let d = Detection::normalize(label, 0.9, Duration::from_secs(*secs)).unwrap();
            DetectionRecord::derive(&job_id, i, &media, &d).unwrap()
        })
        .collect();

    let first = store.write_batch(&job_id, records.clone()).await.unwrap();
    assert!(!first.is_duplicate());
    let second = store.write_batch(&job_id, records.clone()).await.unwrap();
    assert!(second.is_duplicate());
    assert_eq!(second.records(), records.as_slice());

    let criteria = QueryCriteria::new().with_camera(camera).normalized().unwrap();
    let found = store.scan(&criteria).await.unwrap();
    assert_eq!(found, records);
}
