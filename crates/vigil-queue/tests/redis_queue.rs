//! Queue tests against a live Redis:
//! `REDIS_URL=redis://localhost:6379 cargo test -p vigil-queue -- --ignored`

use futures_util::StreamExt;
use std::time::Duration;

use vigil_models::{AlertEvent, AlertKind, AlertSink, MediaId, MediaUnit, StorageRef};
use vigil_queue::{IngestQueue, QueueConfig, QueueError, RedisAlertChannel, ALERT_CHANNEL};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

fn queue(suffix: &str) -> IngestQueue {
    IngestQueue::new(QueueConfig {
        redis_url: redis_url(),
        stream_name: format!("vigil:test:{}", suffix),
        consumer_group: format!("vigil:test:{}:workers", suffix),
        dlq_stream_name: format!("vigil:test:{}:dlq", suffix),
        max_retries: 2,
    })
    .unwrap()
}

fn media() -> MediaUnit {
    MediaUnit::new("cam-7", "Warehouse", StorageRef::new("cam-7/seg.mp4"))
        .with_id(MediaId::new())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = queue(&MediaId::new().to_string());
    queue.init().await.unwrap();
    queue.init().await.unwrap();

    let unit = media();
    queue.enqueue(&unit).await.unwrap();
    assert!(matches!(
        queue.enqueue(&unit).await,
        Err(QueueError::Duplicate(_))
    ));

    let deliveries = queue
        .consume("worker-a", Duration::from_millis(100), 10)
        .await
        .unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].envelope.media, unit);

    queue.ack(&deliveries[0].message_id).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_idle_entries_are_claimed_and_dead_lettered() {
    let queue = queue(&MediaId::new().to_string());
    queue.init().await.unwrap();
    queue.enqueue(&media()).await.unwrap();

    let first = queue
        .consume("crashed", Duration::from_millis(100), 10)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let claimed = queue
        .claim_pending("rescuer", Duration::from_millis(10), 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].message_id, first[0].message_id);

    queue.dlq(&claimed[0], "decode failed").await.unwrap();
    assert_eq!(queue.dlq_len().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_alerts_are_published() {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut pubsub = client.get_async_pubsub().await.unwrap();
    pubsub.subscribe(ALERT_CHANNEL).await.unwrap();

    let channel = RedisAlertChannel::spawn(&redis_url()).unwrap();
    channel.alert(AlertEvent::for_media(
        AlertKind::JobFailed,
        MediaId::from_string("m-9"),
        "backend failure",
    ));

    let msg = tokio::time::timeout(Duration::from_secs(5), pubsub.on_message().next())
        .await
        .unwrap()
        .unwrap();
    let payload: String = msg.get_payload().unwrap();
    let event: AlertEvent = serde_json::from_str(&payload).unwrap();
    assert_eq!(event.kind, AlertKind::JobFailed);
}
