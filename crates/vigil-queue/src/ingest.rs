//! Ingestion queue over Redis Streams.
//!
//! Each entry carries one durably stored [`MediaUnit`] descriptor. Workers
//! read through a consumer group, ack on completion, and reclaim entries left
//! pending by crashed consumers.

use chrono::{DateTime, Utc};
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use vigil_models::MediaUnit;

use crate::error::{QueueError, QueueResult};

/// How long an ingestion key blocks re-delivery of the same media id.
const DEDUP_TTL_SECS: u64 = 24 * 3600;

/// Retry counters outlive any reasonable redelivery window.
const RETRY_TTL_SECS: i64 = 24 * 3600;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream carrying media descriptors
    pub stream_name: String,
    /// Consumer group shared by all workers
    pub consumer_group: String,
    /// Dead letter stream
    pub dlq_stream_name: String,
    /// Infrastructure failures tolerated before dead-lettering
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vigil:ingest".to_string(),
            consumer_group: "vigil:workers".to_string(),
            dlq_stream_name: "vigil:ingest:dlq".to_string(),
            max_retries: 3,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("INGEST_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("INGEST_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("INGEST_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("INGEST_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// Stream payload: a media descriptor plus enqueue metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestEnvelope {
    pub media: MediaUnit,
    pub enqueued_at: DateTime<Utc>,
}

impl IngestEnvelope {
    pub fn new(media: MediaUnit) -> Self {
        Self {
            media,
            enqueued_at: Utc::now(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        self.media.idempotency_key()
    }
}

/// One delivered stream entry.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub envelope: IngestEnvelope,
}

/// Decode a stream entry's `media` field.
fn decode_entry(entry: &StreamId) -> QueueResult<IngestEnvelope> {
    let payload: String = entry.get("media").ok_or_else(|| QueueError::Malformed {
        id: entry.id.clone(),
        reason: "missing media field".to_string(),
    })?;
    serde_json::from_str(&payload).map_err(|e| QueueError::Malformed {
        id: entry.id.clone(),
        reason: e.to_string(),
    })
}

/// Ingestion queue client.
pub struct IngestQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl IngestQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    fn dedup_key(idempotency_key: &str) -> String {
        format!("vigil:dedup:{}", idempotency_key)
    }

    fn retry_key(message_id: &str) -> String {
        format!("vigil:retry:{}", message_id)
    }

    /// Create the consumer group if it does not exist yet.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }
        Ok(())
    }

    /// Enqueue a media descriptor. A media id is accepted once.
    pub async fn enqueue(&self, media: &MediaUnit) -> QueueResult<String> {
        let mut conn = self.conn().await?;
        let envelope = IngestEnvelope::new(media.clone());
        let key = envelope.idempotency_key();
        let dedup_key = Self::dedup_key(&key);

        // SET NX reserves the key atomically
        let reserved: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        if reserved.is_none() {
            warn!(media_id = %media.id, "Duplicate ingestion rejected");
            return Err(QueueError::Duplicate(key));
        }

        let payload = serde_json::to_string(&envelope)?;
        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("media")
            .arg(&payload)
            .arg("key")
            .arg(&key)
            .query_async(&mut conn)
            .await;

        match added {
            Ok(message_id) => {
                info!(
                    media_id = %media.id,
                    camera_id = %media.camera_id,
                    message_id = %message_id,
                    "Enqueued media unit"
                );
                Ok(message_id)
            }
            Err(e) => {
                // Release the reservation so the caller can retry
                conn.del::<_, ()>(&dedup_key).await.ok();
                Err(QueueError::enqueue_failed(e.to_string()))
            }
        }
    }

    /// Read new entries for `consumer_name`. Malformed entries are acked and dropped.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        self.decode_all(entries).await
    }

    /// Claim entries another consumer left pending for at least `min_idle`.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = pending.ids.iter().map(|p| p.id.as_str()).collect();
        let claimed: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg(&ids)
            .query_async(&mut conn)
            .await?;

        let deliveries = self.decode_all(claimed.ids).await?;
        for delivery in &deliveries {
            info!(
                media_id = %delivery.envelope.media.id,
                message_id = %delivery.message_id,
                "Claimed pending media unit"
            );
        }
        Ok(deliveries)
    }

    async fn decode_all(&self, entries: Vec<StreamId>) -> QueueResult<Vec<Delivery>> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            match decode_entry(&entry) {
                Ok(envelope) => deliveries.push(Delivery {
                    message_id: entry.id,
                    envelope,
                }),
                Err(e) => {
                    warn!(error = %e, "Dropping malformed ingestion entry");
                    self.ack(&entry.id).await.ok();
                }
            }
        }
        Ok(deliveries)
    }

    /// Acknowledge and delete a finished entry.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;
        conn.del::<_, ()>(Self::retry_key(message_id)).await?;

        debug!(message_id, "Acknowledged ingestion entry");
        Ok(())
    }

    /// Move an entry to the dead letter stream and ack the original.
    pub async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&delivery.envelope)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("media")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&delivery.message_id).await?;
        warn!(
            media_id = %delivery.envelope.media.id,
            error,
            "Moved media unit to DLQ"
        );
        Ok(())
    }

    /// Increment and return the infrastructure failure count of an entry.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;
        let key = Self::retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, RETRY_TTL_SECS).await?;
        Ok(count)
    }

    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    /// Liveness check.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
