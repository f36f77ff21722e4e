use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Notify;
use uuid::Uuid;

use docshield_db::{RedactionJobRepository, NEW_JOB_CHANNEL};

use super::{compute_retry_backoff, DeadLetter, Delivery, JobQueue, JobReference, OutgoingJob};

/// Transport backed by the `redaction_jobs` table.
///
/// Consumers wake on `NOTIFY` when a job is enqueued and otherwise poll.
pub struct PgJobQueue {
    repository: RedactionJobRepository,
    visibility_timeout: Duration,
    max_attempts: i32,
    notify: Arc<Notify>,
}

impl PgJobQueue {
    /// Create the queue and spawn its LISTEN task.
    pub fn new(pool: PgPool, visibility_timeout: Duration, max_attempts: i32) -> Self {
        let notify = Arc::new(Notify::new());
        Self::spawn_listener(pool.clone(), notify.clone());

        Self {
            repository: RedactionJobRepository::new(pool),
            visibility_timeout,
            max_attempts: max_attempts.max(1),
            notify,
        }
    }

    fn spawn_listener(pool: PgPool, notify: Arc<Notify>) {
        tokio::spawn(async move {
            loop {
                match sqlx::postgres::PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(NEW_JOB_CHANNEL).await {
                            tracing::warn!(error = %e, "LISTEN failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                        while listener.recv().await.is_ok() {
                            notify.notify_one();
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "PgListener connect failed, will retry");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
    }

    fn lease_of(delivery: &Delivery) -> Result<(Uuid, Uuid)> {
        let job_id = Uuid::parse_str(&delivery.job_id).context("Invalid job id in delivery")?;
        let lease = Uuid::parse_str(&delivery.receipt).context("Invalid receipt in delivery")?;
        Ok((job_id, lease))
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: OutgoingJob) -> Result<JobReference> {
        let body = String::from_utf8(job.body).context("Job body is not UTF-8")?;
        let enqueued = self
            .repository
            .enqueue(&job.dedup_key, &job.group_id, &body, self.max_attempts)
            .await?;

        Ok(JobReference {
            job_id: enqueued.id.to_string(),
            deduplicated: enqueued.deduplicated,
        })
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let claimed = self
            .repository
            .claim_batch(max as i64, self.visibility_timeout)
            .await?;

        Ok(claimed
            .into_iter()
            .map(|job| Delivery {
                job_id: job.id.to_string(),
                receipt: job.lease_token.to_string(),
                body: job.body.into_bytes(),
                attempt: job.attempts.max(1) as u32,
            })
            .collect())
    }

    async fn collect_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let dead = self.repository.dead_letter_expired().await?;

        Ok(dead
            .into_iter()
            .map(|job| DeadLetter {
                job_id: job.id.to_string(),
                body: job.body.into_bytes(),
            })
            .collect())
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let (job_id, lease) = Self::lease_of(delivery)?;
        if !self.repository.complete(job_id, lease).await? {
            tracing::warn!(job_id = %job_id, "Ack for job whose lease was lost");
        }
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let (job_id, lease) = Self::lease_of(delivery)?;
        let delay = compute_retry_backoff(delivery.attempt);
        if !self
            .repository
            .release(job_id, lease, delay, reason)
            .await?
        {
            tracing::warn!(job_id = %job_id, "Release for job whose lease was lost");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }

    fn notifier(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }
}
