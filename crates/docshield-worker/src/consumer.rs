//! Job consumer: worker pool, notify-or-poll wakeups, ack/release.
//!
//! Each claim cycle first collects jobs the queue dead-lettered after their
//! final lease expired, and marks the documents they left in `Processing`
//! as `Failed`.
//!
//! Shutdown: [`JobConsumer::shutdown`] stops claiming, cancels the deadlines
//! of in-flight jobs (which then take their failure path and are released for
//! redelivery) and waits for them to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use docshield_core::config::Config;
use docshield_core::error::LogLevel;

use crate::deadline::JobDeadline;
use crate::pipeline::RedactionPipeline;
use crate::queue::{Delivery, JobQueue};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_concurrency: usize,
    pub poll_interval: Duration,
    /// Deadline given to each delivery: job timeout minus cleanup slack.
    pub job_budget: Duration,
    /// How long shutdown waits for in-flight jobs.
    pub shutdown_grace: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            job_budget: Duration::from_secs(295),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl ConsumerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrency: config.worker_max_concurrency(),
            poll_interval: config.worker_poll_interval(),
            job_budget: config.job_processing_budget(),
            shutdown_grace: config.job_cleanup_slack() * 2,
        }
    }
}

pub struct JobConsumer {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl JobConsumer {
    /// Spawn the worker pool.
    pub fn start(
        queue: Arc<dyn JobQueue>,
        pipeline: Arc<RedactionPipeline>,
        config: ConsumerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(Self::worker_pool(queue, pipeline, config, shutdown_rx));
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the pool and wait for in-flight jobs (bounded by the shutdown grace).
    pub async fn shutdown(self) {
        tracing::info!("Initiating job consumer shutdown");
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Job consumer pool task failed");
        }
    }

    async fn worker_pool(
        queue: Arc<dyn JobQueue>,
        pipeline: Arc<RedactionPipeline>,
        config: ConsumerConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let max_workers = config.max_concurrency.max(1);
        let notifier = queue.notifier();
        tracing::info!(
            queue = queue.name(),
            max_workers = max_workers,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            job_budget_ms = config.job_budget.as_millis() as u64,
            push_notifications = notifier.is_some(),
            "Job consumer worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(max_workers));
        let shutdown_token = CancellationToken::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job consumer worker pool shutting down");
                    break;
                }
                _ = Self::wait_for_notification(notifier.as_deref()) => {
                    Self::claim_and_dispatch(&queue, &pipeline, &semaphore, &config, &shutdown_token).await;
                }
                _ = sleep(config.poll_interval) => {
                    Self::claim_and_dispatch(&queue, &pipeline, &semaphore, &config, &shutdown_token).await;
                }
            }
        }

        shutdown_token.cancel();
        let drained = tokio::time::timeout(
            config.shutdown_grace,
            semaphore.acquire_many(max_workers as u32),
        )
        .await;
        if drained.is_err() {
            tracing::warn!("In-flight jobs still running after shutdown grace period");
        }

        tracing::info!("Job consumer worker pool stopped");
    }

    async fn wait_for_notification(notifier: Option<&Notify>) {
        match notifier {
            Some(notify) => notify.notified().await,
            None => std::future::pending().await,
        }
    }

    async fn claim_and_dispatch(
        queue: &Arc<dyn JobQueue>,
        pipeline: &Arc<RedactionPipeline>,
        semaphore: &Arc<Semaphore>,
        config: &ConsumerConfig,
        shutdown_token: &CancellationToken,
    ) {
        Self::settle_dead_letters(queue.as_ref(), pipeline).await;

        let available = semaphore.available_permits();
        if available == 0 {
            tracing::debug!("No workers available, skipping claim");
            return;
        }

        let deliveries = match queue.receive(available).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                tracing::error!(error = %e, queue = queue.name(), "Failed to receive jobs from queue");
                return;
            }
        };

        if deliveries.is_empty() {
            tracing::trace!("No jobs available in queue");
            return;
        }

        for delivery in deliveries {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    // Leave it leased; the visibility timeout brings it back.
                    tracing::warn!(job_id = %delivery.job_id, "No worker free for received job");
                    continue;
                }
            };

            let queue = queue.clone();
            let pipeline = pipeline.clone();
            let deadline = JobDeadline::with_token(config.job_budget, shutdown_token.child_token());

            tokio::spawn(async move {
                let _permit = permit;
                Self::handle_delivery(queue.as_ref(), &pipeline, delivery, deadline).await;
            });
        }
    }

    /// Mark documents of abandoned, dead-lettered jobs `Failed`.
    pub async fn settle_dead_letters(queue: &dyn JobQueue, pipeline: &RedactionPipeline) {
        let dead = match queue.collect_dead_letters().await {
            Ok(dead) => dead,
            Err(e) => {
                tracing::error!(error = %e, queue = queue.name(), "Failed to collect dead-lettered jobs");
                return;
            }
        };

        for letter in dead {
            tracing::warn!(job_id = %letter.job_id, "Settling dead-lettered redaction job");
            pipeline.abandon_job(&letter.body).await;
        }
    }

    /// Run one delivery and settle it with the queue.
    #[tracing::instrument(
        skip(queue, pipeline, delivery, deadline),
        fields(job.id = %delivery.job_id, job.attempt = delivery.attempt)
    )]
    pub async fn handle_delivery(
        queue: &dyn JobQueue,
        pipeline: &RedactionPipeline,
        delivery: Delivery,
        deadline: JobDeadline,
    ) {
        let result = pipeline
            .process_delivery(&delivery.body, delivery.attempt, &deadline)
            .await;

        let settled = match result {
            Ok(_) => queue.ack(&delivery).await,
            Err(err) if !err.is_retryable() => {
                match err.log_level() {
                    LogLevel::Error => tracing::error!(
                        error = %err,
                        error_type = err.error_type(),
                        "Redaction job failed permanently, dropping"
                    ),
                    LogLevel::Warn => tracing::warn!(
                        error = %err,
                        error_type = err.error_type(),
                        "Redaction job dropped"
                    ),
                }
                queue.ack(&delivery).await
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    error_type = err.error_type(),
                    attempt = delivery.attempt,
                    "Redaction job failed, releasing for redelivery"
                );
                queue.release(&delivery, &err.to_string()).await
            }
        };

        if let Err(e) = settled {
            // The visibility timeout will redeliver it.
            tracing::error!(error = %e, job_id = %delivery.job_id, "Failed to settle job with queue");
        }
    }
}
