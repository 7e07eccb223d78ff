//! Redis record store engine.
//!
//! Layout:
//! - `vigil:media:<id>` media descriptor JSON
//! - `vigil:record:<id>` record JSON
//! - `vigil:job:<id>` commit marker (JSON list of record ids)
//! - `vigil:idx:time`, `vigil:idx:camera:<camera>`, `vigil:idx:label:<label>`
//!   sorted sets scored by detection time in milliseconds
//!
//! A job's batch and its commit marker are written by one Lua script, so
//! readers never observe a partially committed job.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use vigil_models::{DetectionRecord, JobId, MediaId, MediaUnit, QueryCriteria, RecordId};

use crate::error::{RecordError, RecordResult};
use crate::store::{BatchOutcome, RecordStore};

const KEY_PREFIX: &str = "vigil";

// Index keys are derived inside the script, so this assumes a single Redis node.
const COMMIT_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  return existing
end
local prefix = ARGV[2]
local i = 3
while i <= #ARGV do
  local id, body, score, camera, label = ARGV[i], ARGV[i + 1], ARGV[i + 2], ARGV[i + 3], ARGV[i + 4]
  redis.call('SET', prefix .. ':record:' .. id, body)
  redis.call('ZADD', prefix .. ':idx:time', score, id)
  redis.call('ZADD', prefix .. ':idx:camera:' .. camera, score, id)
  redis.call('ZADD', prefix .. ':idx:label:' .. label, score, id)
  i = i + 5
end
redis.call('SET', KEYS[1], ARGV[1])
return false
"#;

/// Record store backed by Redis.
pub struct RedisRecordStore {
    client: redis::Client,
    commit_script: redis::Script,
}

impl RedisRecordStore {
    pub fn new(redis_url: &str) -> RecordResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            commit_script: redis::Script::new(COMMIT_SCRIPT),
        })
    }

    async fn conn(&self) -> RecordResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn media_key(id: &MediaId) -> String {
        format!("{}:media:{}", KEY_PREFIX, id)
    }

    fn record_key(id: &RecordId) -> String {
        format!("{}:record:{}", KEY_PREFIX, id)
    }

    fn job_key(id: &JobId) -> String {
        format!("{}:job:{}", KEY_PREFIX, id)
    }

    fn index_key(criteria: &QueryCriteria) -> String {
        if let Some(camera) = &criteria.camera_id {
            format!("{}:idx:camera:{}", KEY_PREFIX, camera)
        } else if let Some(label) = &criteria.object_type {
            format!("{}:idx:label:{}", KEY_PREFIX, label)
        } else {
            format!("{}:idx:time", KEY_PREFIX)
        }
    }

    async fn load_records(
        conn: &mut redis::aio::MultiplexedConnection,
        ids: &[RecordId],
    ) -> RecordResult<Vec<DetectionRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(Self::record_key).collect();
        let bodies: Vec<Option<String>> = redis::cmd("MGET").arg(&keys).query_async(conn).await?;
        bodies
            .into_iter()
            .flatten()
            .map(|body| serde_json::from_str(&body).map_err(RecordError::from))
            .collect()
    }
}

/// Score bounds covering an inclusive time range at millisecond resolution.
fn score_bounds(criteria: &QueryCriteria) -> (String, String) {
    let range = criteria.time_range.unwrap_or_default();
    let min = range
        .start
        .map(|t| t.timestamp_millis().to_string())
        .unwrap_or_else(|| "-inf".to_string());
    let max = range
        .end
        // Round up so sub-millisecond timestamps at the boundary stay in range
        .map(|t| {
            let ms = t.timestamp_millis();
            if t.timestamp_subsec_nanos() % 1_000_000 == 0 {
                ms.to_string()
            } else {
                (ms + 1).to_string()
            }
        })
        .unwrap_or_else(|| "+inf".to_string());
    (min, max)
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn put_media(&self, media: &MediaUnit) -> RecordResult<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(media)?;
        // NX: descriptors are immutable once registered
        redis::cmd("SET")
            .arg(Self::media_key(&media.id))
            .arg(body)
            .arg("NX")
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_media(&self, id: &MediaId) -> RecordResult<Option<MediaUnit>> {
        let mut conn = self.conn().await?;
        let body: Option<String> = conn.get(Self::media_key(id)).await?;
        body.map(|b| serde_json::from_str(&b).map_err(RecordError::from))
            .transpose()
    }

    async fn write_batch(
        &self,
        job_id: &JobId,
        records: Vec<DetectionRecord>,
    ) -> RecordResult<BatchOutcome> {
        let mut conn = self.conn().await?;

        let ids: Vec<&RecordId> = records.iter().map(|r| &r.record_id).collect();
        let marker = serde_json::to_string(&ids)?;

        let mut invocation = self.commit_script.prepare_invoke();
        invocation
            .key(Self::job_key(job_id))
            .arg(marker)
            .arg(KEY_PREFIX);
        for record in &records {
            invocation
                .arg(record.record_id.as_str())
                .arg(serde_json::to_string(record)?)
                .arg(record.detected_at.timestamp_millis())
                .arg(&record.camera_id)
                .arg(&record.label);
        }

        let existing: Option<String> = invocation.invoke_async(&mut conn).await?;
        match existing {
            None => {
                debug!(job_id = %job_id, records = records.len(), "Committed record batch");
                Ok(BatchOutcome::Written(records))
            }
            Some(marker) => {
                let ids: Vec<RecordId> = serde_json::from_str(&marker)?;
                let stored = Self::load_records(&mut conn, &ids).await?;
                Ok(BatchOutcome::AlreadyCommitted(stored))
            }
        }
    }

    async fn scan(&self, criteria: &QueryCriteria) -> RecordResult<Vec<DetectionRecord>> {
        let mut conn = self.conn().await?;
        let (min, max) = score_bounds(criteria);

        let ids: Vec<String> = conn
            .zrangebyscore(Self::index_key(criteria), min, max)
            .await?;
        let ids: Vec<RecordId> = ids.into_iter().map(RecordId).collect();

        let mut records: Vec<DetectionRecord> = Self::load_records(&mut conn, &ids)
            .await?
            .into_iter()
            .filter(|record| criteria.matches(record))
            .collect();
        records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(records)
    }

    async fn records_for_job(&self, job_id: &JobId) -> RecordResult<Option<Vec<DetectionRecord>>> {
        let mut conn = self.conn().await?;
        let marker: Option<String> = conn.get(Self::job_key(job_id)).await?;
        match marker {
            None => Ok(None),
            Some(marker) => {
                let ids: Vec<RecordId> = serde_json::from_str(&marker)?;
                Ok(Some(Self::load_records(&mut conn, &ids).await?))
            }
        }
    }

    async fn ping(&self) -> RecordResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}
