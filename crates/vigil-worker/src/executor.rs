//! Queue executor: feeds ingested media units into the pipeline.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vigil_queue::{Delivery, IngestQueue};

use crate::config::WorkerConfig;
use crate::coordinator::{Pipeline, PipelineOutcome};
use crate::error::{WorkerError, WorkerResult};
use crate::retry::FailureTracker;

/// Most entries read from the stream in one call.
const MAX_BATCH: usize = 5;

/// Pulls media units from the ingestion stream with bounded concurrency.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<IngestQueue>,
    pipeline: Arc<Pipeline>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: IngestQueue, pipeline: Pipeline) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            pipeline: Arc::new(pipeline),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`JobExecutor::shutdown`] is called.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.queue.init().await?;

        let claim_task = self.spawn_claim_task();
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(5);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_batch() => match result {
                    Ok(()) => failures.record_success(),
                    Err(e) => {
                        if failures.record_failure() {
                            error!(error = %e, failures = failures.failure_count(), "Error consuming ingestion stream");
                        }
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight media units to complete");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Shutdown timeout elapsed with media units still in flight"
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over entries a crashed consumer left pending.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let pipeline = Arc::clone(&self.pipeline);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let interval = self.config.claim_interval;
        let min_idle = self.config.claim_min_idle;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match queue.claim_pending(&consumer_name, min_idle, MAX_BATCH).await {
                            Ok(deliveries) if !deliveries.is_empty() => {
                                info!(count = deliveries.len(), "Claimed pending media units");
                                for delivery in deliveries {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        return;
                                    };
                                    let queue = Arc::clone(&queue);
                                    let pipeline = Arc::clone(&pipeline);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute(pipeline, queue, delivery).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Failed to claim pending media units"),
                        }
                    }
                }
            }
        })
    }

    async fn consume_batch(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(
                &self.consumer_name,
                self.config.consume_block,
                available.min(MAX_BATCH),
            )
            .await?;
        if deliveries.is_empty() {
            return Ok(());
        }
        debug!(count = deliveries.len(), "Consumed media units");

        for delivery in deliveries {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::queue_failed("semaphore closed"))?;
            let queue = Arc::clone(&self.queue);
            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move {
                let _permit = permit;
                Self::execute(pipeline, queue, delivery).await;
            });
        }
        Ok(())
    }

    /// Handle one delivery and settle its stream entry.
    ///
    /// Per-unit outcomes are acked. Infrastructure errors leave the entry
    /// pending for redelivery until the retry budget runs out.
    async fn execute(pipeline: Arc<Pipeline>, queue: Arc<IngestQueue>, delivery: Delivery) {
        let media_id = delivery.envelope.media.id.clone();

        match pipeline.handle(&delivery.envelope.media).await {
            Ok(PipelineOutcome::Skipped) => {
                // Owner task will ack
                debug!(media_id = %media_id, "Delivery skipped");
            }
            Ok(outcome) => {
                debug!(media_id = %media_id, outcome = outcome.as_str(), "Media unit handled");
                if let Err(e) = queue.ack(&delivery.message_id).await {
                    error!(media_id = %media_id, error = %e, "Failed to ack ingestion entry");
                }
            }
            Err(e) if e.is_retryable() => {
                let attempts = match queue.increment_retry(&delivery.message_id).await {
                    Ok(n) => n,
                    Err(retry_err) => {
                        warn!(media_id = %media_id, error = %retry_err, "Failed to track retry count");
                        u32::MAX
                    }
                };
                if attempts >= queue.max_retries() {
                    warn!(
                        media_id = %media_id,
                        attempts,
                        error = %e,
                        "Media unit exceeded retry budget, moving to DLQ"
                    );
                    Self::dead_letter(&queue, &delivery, &e).await;
                } else {
                    info!(
                        media_id = %media_id,
                        attempt = attempts,
                        max_retries = queue.max_retries(),
                        error = %e,
                        "Media unit will be redelivered"
                    );
                }
            }
            Err(e) => {
                error!(media_id = %media_id, error = %e, "Media unit failed permanently");
                Self::dead_letter(&queue, &delivery, &e).await;
            }
        }
    }

    async fn dead_letter(queue: &IngestQueue, delivery: &Delivery, cause: &WorkerError) {
        if let Err(e) = queue.dlq(delivery, &cause.to_string()).await {
            error!(
                media_id = %delivery.envelope.media.id,
                error = %e,
                "Failed to move media unit to DLQ"
            );
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
