//! Application state.

use async_trait::async_trait;
use std::sync::Arc;

use vigil_models::{AlertSink, MediaUnit};
use vigil_queue::{IngestQueue, QueueResult, RedisAlertChannel};
use vigil_records::{QueryConfig, QueryEngine, RecordStore, RecordStoreConfig};
use vigil_storage::{BlobStore, S3BlobStore};

use crate::alerts::QueryAlertSink;
use crate::config::ApiConfig;

/// Where validated media descriptors are handed to the worker fleet.
#[async_trait]
pub trait MediaIngest: Send + Sync {
    /// Enqueue `media`, returning the queue message id.
    async fn submit(&self, media: &MediaUnit) -> QueueResult<String>;

    async fn ping(&self) -> QueueResult<()>;
}

#[async_trait]
impl MediaIngest for IngestQueue {
    async fn submit(&self, media: &MediaUnit) -> QueueResult<String> {
        self.enqueue(media).await
    }

    async fn ping(&self) -> QueueResult<()> {
        IngestQueue::ping(self).await
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: Arc<QueryEngine>,
    pub store: Arc<dyn RecordStore>,
    pub ingest: Arc<dyn MediaIngest>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        engine: QueryEngine,
        store: Arc<dyn RecordStore>,
        ingest: Arc<dyn MediaIngest>,
    ) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            store,
            ingest,
        }
    }

    /// Connect every backend from environment variables.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let blobs: Arc<dyn BlobStore> = Arc::new(S3BlobStore::from_env().await?);
        let store = RecordStoreConfig::from_env()?.connect()?;
        let queue = IngestQueue::from_env()?;

        let channel = RedisAlertChannel::spawn(&queue.config().redis_url)?;
        let alerts: Arc<dyn AlertSink> =
            Arc::new(QueryAlertSink::new().with_forward(Arc::new(channel)));

        let engine = QueryEngine::new(
            Arc::clone(&store),
            blobs,
            alerts,
            QueryConfig::from_env(),
        );
        Ok(Self::new(config, engine, store, Arc::new(queue)))
    }
}
