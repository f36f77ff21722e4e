use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;

/// LISTEN/NOTIFY channel signalled whenever a job is enqueued.
pub const NEW_JOB_CHANNEL: &str = "docshield_new_job";

/// Result of an enqueue: the job now carrying the dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueuedJob {
    pub id: Uuid,
    /// True when an in-flight job with the same key absorbed the request.
    pub deduplicated: bool,
}

/// A job leased to a consumer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub body: String,
    pub attempts: i32,
    pub lease_token: Uuid,
}

/// A job retired by [`RedactionJobRepository::dead_letter_expired`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetteredJob {
    pub id: Uuid,
    pub dedup_key: String,
    pub body: String,
}

/// Repository for the `redaction_jobs` table.
///
/// Jobs are `pending` until claimed, `running` while leased, and end as
/// `completed` or `dead_letter`. A running job whose lease expires becomes
/// claimable again, which gives at-least-once delivery.
#[derive(Clone)]
pub struct RedactionJobRepository {
    pool: PgPool,
}

impl RedactionJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a job unless one with the same dedup key is still in flight.
    #[tracing::instrument(skip(self, body), fields(db.table = "redaction_jobs", db.operation = "insert"))]
    pub async fn enqueue(
        &self,
        dedup_key: &str,
        group_id: &str,
        body: &str,
        max_attempts: i32,
    ) -> Result<EnqueuedJob> {
        // The in-flight job can finish between the insert and the lookup; retry once.
        for _ in 0..2 {
            let mut tx = self
                .pool
                .begin()
                .await
                .context("Failed to begin transaction for job enqueue")?;

            let inserted: Option<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
                r#"
                INSERT INTO redaction_jobs (dedup_key, group_id, body, max_attempts)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (dedup_key) WHERE status IN ('pending', 'running') DO NOTHING
                RETURNING id
                "#,
            )
            .bind(dedup_key)
            .bind(group_id)
            .bind(body)
            .bind(max_attempts)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to insert redaction job")?;

            if let Some(id) = inserted {
                // Workers fall back to polling if the notification is lost.
                if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
                    .bind(NEW_JOB_CHANNEL)
                    .execute(&mut *tx)
                    .await
                {
                    tracing::warn!(
                        error = %e,
                        job_id = %id,
                        "Failed to send pg_notify for new job, workers will discover it via polling"
                    );
                }

                tx.commit()
                    .await
                    .context("Failed to commit job enqueue transaction")?;

                tracing::info!(job_id = %id, dedup_key = %dedup_key, "Redaction job enqueued");
                return Ok(EnqueuedJob {
                    id,
                    deduplicated: false,
                });
            }

            let existing: Option<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
                r#"
                SELECT id FROM redaction_jobs
                WHERE dedup_key = $1 AND status IN ('pending', 'running')
                "#,
            )
            .bind(dedup_key)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up in-flight redaction job")?;

            tx.rollback().await.ok();

            if let Some(id) = existing {
                tracing::info!(
                    job_id = %id,
                    dedup_key = %dedup_key,
                    "Redaction job deduplicated against in-flight job"
                );
                return Ok(EnqueuedJob {
                    id,
                    deduplicated: true,
                });
            }
        }

        Err(anyhow::anyhow!(
            "Could not enqueue or find in-flight job for dedup key {}",
            dedup_key
        ))
    }

    /// Move due jobs that already used all their attempts to `dead_letter`.
    ///
    /// Returns each job once: those whose final lease expired without a
    /// `complete` or `release`. Jobs released on their last attempt go to
    /// `dead_letter` directly and are not returned.
    #[tracing::instrument(skip(self), fields(db.table = "redaction_jobs", db.operation = "update"))]
    pub async fn dead_letter_expired(&self) -> Result<Vec<DeadLetteredJob>> {
        let dead: Vec<DeadLetteredJob> = sqlx::query_as::<Postgres, DeadLetteredJob>(
            r#"
            UPDATE redaction_jobs
            SET status = 'dead_letter',
                lease_token = NULL,
                last_error = COALESCE(last_error, 'lease expired on final attempt'),
                updated_at = NOW()
            WHERE status IN ('pending', 'running')
                AND visible_at <= NOW()
                AND attempts >= max_attempts
            RETURNING id, dedup_key, body
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to dead-letter exhausted jobs")?;

        for job in &dead {
            tracing::warn!(
                job_id = %job.id,
                dedup_key = %job.dedup_key,
                "Redaction job exceeded max attempts, moved to dead letter"
            );
        }

        Ok(dead)
    }

    /// Lease up to `limit` due jobs for `visibility_timeout`.
    ///
    /// Exhausted jobs are skipped; [`Self::dead_letter_expired`] retires them.
    #[tracing::instrument(skip(self), fields(db.table = "redaction_jobs", db.operation = "claim"))]
    pub async fn claim_batch(
        &self,
        limit: i64,
        visibility_timeout: Duration,
    ) -> Result<Vec<ClaimedJob>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let claimed: Vec<ClaimedJob> = sqlx::query_as::<Postgres, ClaimedJob>(
            r#"
            WITH next AS (
                SELECT id FROM redaction_jobs
                WHERE status IN ('pending', 'running')
                    AND visible_at <= NOW()
                    AND attempts < max_attempts
                ORDER BY created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE redaction_jobs j
            SET status = 'running',
                attempts = j.attempts + 1,
                visible_at = NOW() + make_interval(secs => $2),
                lease_token = gen_random_uuid(),
                updated_at = NOW()
            FROM next
            WHERE j.id = next.id
            RETURNING j.id, j.body, j.attempts, j.lease_token
            "#,
        )
        .bind(limit)
        .bind(visibility_timeout.as_secs_f64())
        .fetch_all(&mut *tx)
        .await
        .context("Failed to claim redaction jobs")?;

        tx.commit().await.context("Failed to commit transaction")?;

        for job in &claimed {
            tracing::debug!(job_id = %job.id, attempt = job.attempts, "Redaction job claimed");
        }

        Ok(claimed)
    }

    /// Mark a leased job completed. Returns false if the lease was lost.
    #[tracing::instrument(skip(self), fields(db.table = "redaction_jobs", db.operation = "update"))]
    pub async fn complete(&self, job_id: Uuid, lease_token: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE redaction_jobs
            SET status = 'completed',
                lease_token = NULL,
                updated_at = NOW()
            WHERE id = $1 AND lease_token = $2 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(lease_token)
        .execute(&self.pool)
        .await
        .context("Failed to mark redaction job completed")?;

        Ok(result.rows_affected() == 1)
    }

    /// Return a leased job to the queue after `delay`, or dead-letter it when
    /// no attempts remain. Returns false if the lease was lost.
    #[tracing::instrument(skip(self, reason), fields(db.table = "redaction_jobs", db.operation = "update"))]
    pub async fn release(
        &self,
        job_id: Uuid,
        lease_token: Uuid,
        delay: Duration,
        reason: &str,
    ) -> Result<bool> {
        let status: Option<String> = sqlx::query_scalar::<Postgres, String>(
            r#"
            UPDATE redaction_jobs
            SET status = CASE WHEN attempts >= max_attempts THEN 'dead_letter' ELSE 'pending' END,
                visible_at = NOW() + make_interval(secs => $3),
                lease_token = NULL,
                last_error = $4,
                updated_at = NOW()
            WHERE id = $1 AND lease_token = $2 AND status = 'running'
            RETURNING status
            "#,
        )
        .bind(job_id)
        .bind(lease_token)
        .bind(delay.as_secs_f64())
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to release redaction job")?;

        match status.as_deref() {
            Some("dead_letter") => {
                tracing::warn!(
                    job_id = %job_id,
                    reason = %reason,
                    "Redaction job exceeded max attempts, moved to dead letter"
                );
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}
