//! Job queue selection

use std::sync::Arc;

#[cfg(feature = "queue-sqs")]
use anyhow::Context;
use anyhow::Result;
use docshield_core::{Config, QueueBackend};
use docshield_worker::{JobQueue, PgJobQueue};
use sqlx::PgPool;

/// Build the transport named by `QUEUE_BACKEND`.
pub async fn setup_queue(config: &Config, pool: &PgPool) -> Result<Arc<dyn JobQueue>> {
    let queue: Arc<dyn JobQueue> = match config.queue_backend() {
        QueueBackend::Postgres => Arc::new(PgJobQueue::new(
            pool.clone(),
            config.queue_visibility_timeout(),
            config.queue_max_attempts(),
        )),

        #[cfg(feature = "queue-sqs")]
        QueueBackend::Sqs => {
            let queue_url = config
                .sqs_queue_url()
                .context("SQS_QUEUE_URL not configured")?;
            Arc::new(
                docshield_worker::SqsJobQueue::new(
                    queue_url.to_string(),
                    config.sqs_dead_letter_queue_url().map(String::from),
                    config.aws_region().map(String::from),
                    config.queue_visibility_timeout(),
                )
                .await,
            )
        }

        #[cfg(not(feature = "queue-sqs"))]
        QueueBackend::Sqs => anyhow::bail!(
            "SQS queue backend not available (queue-sqs feature not enabled)"
        ),

        QueueBackend::Memory => anyhow::bail!(
            "The memory queue lives inside one process; use the postgres or sqs backend"
        ),
    };

    tracing::info!(
        queue = queue.name(),
        visibility_timeout_secs = config.queue_visibility_timeout().as_secs(),
        max_attempts = config.queue_max_attempts(),
        "Job queue configured"
    );
    Ok(queue)
}
