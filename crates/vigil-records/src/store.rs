//! Record store boundary.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use vigil_models::{DetectionRecord, JobId, MediaId, MediaUnit, QueryCriteria};

use crate::error::{RecordError, RecordResult};
use crate::memory::InMemoryRecordStore;
use crate::redis_store::RedisRecordStore;

/// Result of an atomic batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The batch was written now.
    Written(Vec<DetectionRecord>),
    /// The job was committed earlier; nothing was written.
    AlreadyCommitted(Vec<DetectionRecord>),
}

impl BatchOutcome {
    pub fn records(&self) -> &[DetectionRecord] {
        match self {
            BatchOutcome::Written(records) | BatchOutcome::AlreadyCommitted(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<DetectionRecord> {
        match self {
            BatchOutcome::Written(records) | BatchOutcome::AlreadyCommitted(records) => records,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, BatchOutcome::AlreadyCommitted(_))
    }
}

/// Persistent structured store for media descriptors and detection records.
///
/// Records are indexed by (camera id, detection time), by label, and by
/// detection time alone.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Register an ingested media unit. Re-registering the same id is a no-op.
    async fn put_media(&self, media: &MediaUnit) -> RecordResult<()>;

    async fn get_media(&self, id: &MediaId) -> RecordResult<Option<MediaUnit>>;

    /// Atomically write every record of a job, keyed by job id.
    ///
    /// Either all records become visible or none do. If the job was
    /// committed before, the stored set is returned untouched.
    async fn write_batch(
        &self,
        job_id: &JobId,
        records: Vec<DetectionRecord>,
    ) -> RecordResult<BatchOutcome>;

    /// Committed records matching normalized `criteria`, ordered by
    /// detection time then record id.
    async fn scan(&self, criteria: &QueryCriteria) -> RecordResult<Vec<DetectionRecord>>;

    /// Records committed for a job, or `None` if it was never committed.
    async fn records_for_job(&self, job_id: &JobId) -> RecordResult<Option<Vec<DetectionRecord>>>;

    /// Liveness check.
    async fn ping(&self) -> RecordResult<()>;
}

/// Which engine backs the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStoreKind {
    Redis,
    Memory,
}

/// Record store configuration.
#[derive(Debug, Clone)]
pub struct RecordStoreConfig {
    pub kind: RecordStoreKind,
    pub redis_url: String,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            kind: RecordStoreKind::Redis,
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

impl RecordStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> RecordResult<Self> {
        let kind = match std::env::var("RECORD_STORE")
            .unwrap_or_else(|_| "redis".to_string())
            .to_lowercase()
            .as_str()
        {
            "redis" => RecordStoreKind::Redis,
            "memory" => RecordStoreKind::Memory,
            other => {
                return Err(RecordError::Config(format!(
                    "RECORD_STORE must be 'redis' or 'memory', got '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            kind,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        })
    }

    /// Build the configured store.
    pub fn connect(&self) -> RecordResult<Arc<dyn RecordStore>> {
        match self.kind {
            RecordStoreKind::Redis => {
                info!("Using Redis record store");
                Ok(Arc::new(RedisRecordStore::new(&self.redis_url)?))
            }
            RecordStoreKind::Memory => {
                info!("Using in-memory record store");
                Ok(Arc::new(InMemoryRecordStore::new()))
            }
        }
    }
}
