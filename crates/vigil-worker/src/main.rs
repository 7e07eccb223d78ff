//! Detection pipeline worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vigil_detection::{DetectionBackend, HttpDetectionClient};
use vigil_media::{FfmpegFrameSource, FrameSampler, LocalLocator, MediaLocator};
use vigil_models::AlertSink;
use vigil_queue::{IngestQueue, RedisAlertChannel};
use vigil_records::{IndexerConfig, RecordStoreConfig, ResultIndexer};
use vigil_storage::{BlobStore, S3BlobStore};
use vigil_worker::{
    BlobMediaLocator, JobExecutor, JobManager, MetricsAlertSink, Pipeline, PollPolicy,
    SamplerConfig, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting vigil-worker");

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("invalid METRICS_ADDR")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Serving Prometheus metrics");
    }

    let worker_config = WorkerConfig::from_env();
    let policy = PollPolicy::from_env();
    let sampler_config = SamplerConfig::from_env();
    info!(?worker_config, ?policy, interval = ?sampler_config.interval, "Worker config");

    let blobs: Arc<dyn BlobStore> = Arc::new(
        S3BlobStore::from_env()
            .await
            .context("failed to create blob store client")?,
    );
    let store = RecordStoreConfig::from_env()?.connect()?;
    let client = HttpDetectionClient::from_env()?;
    match client.health_check().await {
        Ok(true) => info!("Detection service is healthy"),
        _ => warn!("Detection service is not reporting healthy; submissions will be retried"),
    }
    let backend: Arc<dyn DetectionBackend> = Arc::new(client);

    let locator: Arc<dyn MediaLocator> = match &sampler_config.media_root {
        Some(root) => Arc::new(LocalLocator::new(root.clone())),
        None => Arc::new(BlobMediaLocator::new(Arc::clone(&blobs))),
    };
    let sampler = FrameSampler::new(
        Arc::new(FfmpegFrameSource::new(locator)),
        sampler_config.preprocess.clone(),
    );

    let queue = IngestQueue::from_env()?;
    let channel = RedisAlertChannel::spawn(&queue.config().redis_url)?;
    let alerts: Arc<dyn AlertSink> =
        Arc::new(MetricsAlertSink::new().with_forward(Arc::new(channel)));

    let indexer = Arc::new(ResultIndexer::new(
        Arc::clone(&store),
        IndexerConfig::from_env(),
    ));
    let jobs = JobManager::new(backend, blobs, indexer, Arc::clone(&alerts), policy);
    let pipeline = Pipeline::new(sampler, store, jobs, alerts, sampler_config.interval);

    let executor = Arc::new(JobExecutor::new(worker_config, queue, pipeline));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!(error = %e, "Executor error");
        return Err(e.into());
    }

    info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vigil=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}
