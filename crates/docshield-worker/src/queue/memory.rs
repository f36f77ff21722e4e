use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{compute_retry_backoff, DeadLetter, Delivery, JobQueue, JobReference, OutgoingJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    DeadLetter,
}

impl JobState {
    fn in_flight(self) -> bool {
        matches!(self, JobState::Pending | JobState::Running)
    }
}

struct Entry {
    id: Uuid,
    dedup_key: String,
    body: Vec<u8>,
    state: JobState,
    attempts: u32,
    visible_at: Instant,
    lease: Option<Uuid>,
    last_error: Option<String>,
}

/// In-process transport with the same dedup, lease, redelivery and
/// dead-letter rules as the Postgres queue. Messages do not survive a restart.
pub struct MemoryJobQueue {
    entries: Mutex<Vec<Entry>>,
    visibility_timeout: Duration,
    max_attempts: u32,
    retry_delay: Option<Duration>,
    notify: Arc<Notify>,
}

impl MemoryJobQueue {
    pub fn new(visibility_timeout: Duration, max_attempts: u32) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            visibility_timeout,
            max_attempts: max_attempts.max(1),
            retry_delay: None,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Use a fixed delay instead of exponential backoff for released jobs.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub async fn state(&self, job_id: &str) -> Option<JobState> {
        let id = Uuid::parse_str(job_id).ok()?;
        self.entries
            .lock()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.state)
    }

    pub async fn last_error(&self, job_id: &str) -> Option<String> {
        let id = Uuid::parse_str(job_id).ok()?;
        self.entries
            .lock()
            .await
            .iter()
            .find(|entry| entry.id == id)
            .and_then(|entry| entry.last_error.clone())
    }

    pub async fn count(&self, state: JobState) -> usize {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.state == state)
            .count()
    }

    fn find_leased<'a>(entries: &'a mut [Entry], delivery: &Delivery) -> Option<&'a mut Entry> {
        let id = Uuid::parse_str(&delivery.job_id).ok()?;
        let lease = Uuid::parse_str(&delivery.receipt).ok()?;
        entries.iter_mut().find(|entry| {
            entry.id == id && entry.lease == Some(lease) && entry.state == JobState::Running
        })
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: OutgoingJob) -> Result<JobReference> {
        let mut entries = self.entries.lock().await;

        if let Some(existing) = entries
            .iter()
            .find(|entry| entry.dedup_key == job.dedup_key && entry.state.in_flight())
        {
            tracing::info!(
                job_id = %existing.id,
                dedup_key = %job.dedup_key,
                "Redaction job deduplicated against in-flight job"
            );
            return Ok(JobReference {
                job_id: existing.id.to_string(),
                deduplicated: true,
            });
        }

        let id = Uuid::new_v4();
        entries.push(Entry {
            id,
            dedup_key: job.dedup_key,
            body: job.body,
            state: JobState::Pending,
            attempts: 0,
            visible_at: Instant::now(),
            lease: None,
            last_error: None,
        });
        drop(entries);

        self.notify.notify_one();

        Ok(JobReference {
            job_id: id.to_string(),
            deduplicated: false,
        })
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut deliveries = Vec::new();

        for entry in entries.iter_mut() {
            if !entry.state.in_flight() || entry.visible_at > now {
                continue;
            }

            // Left for `collect_dead_letters`.
            if entry.attempts >= self.max_attempts {
                continue;
            }

            if deliveries.len() >= max {
                continue;
            }

            let lease = Uuid::new_v4();
            entry.state = JobState::Running;
            entry.attempts += 1;
            entry.visible_at = now + self.visibility_timeout;
            entry.lease = Some(lease);

            deliveries.push(Delivery {
                job_id: entry.id.to_string(),
                receipt: lease.to_string(),
                body: entry.body.clone(),
                attempt: entry.attempts,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut entries = self.entries.lock().await;
        match Self::find_leased(&mut entries, delivery) {
            Some(entry) => {
                entry.state = JobState::Completed;
                entry.lease = None;
            }
            None => tracing::warn!(job_id = %delivery.job_id, "Ack for job whose lease was lost"),
        }
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let delay = self
            .retry_delay
            .unwrap_or_else(|| compute_retry_backoff(delivery.attempt));
        let max_attempts = self.max_attempts;

        let mut entries = self.entries.lock().await;
        match Self::find_leased(&mut entries, delivery) {
            Some(entry) => {
                entry.lease = None;
                entry.last_error = Some(reason.to_string());
                if entry.attempts >= max_attempts {
                    entry.state = JobState::DeadLetter;
                    tracing::warn!(
                        job_id = %entry.id,
                        reason = %reason,
                        "Redaction job exceeded max attempts, moved to dead letter"
                    );
                } else {
                    entry.state = JobState::Pending;
                    entry.visible_at = Instant::now() + delay;
                }
            }
            None => {
                tracing::warn!(job_id = %delivery.job_id, "Release for job whose lease was lost")
            }
        }
        Ok(())
    }

    async fn collect_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let mut dead = Vec::new();

        for entry in entries.iter_mut() {
            if !entry.state.in_flight()
                || entry.visible_at > now
                || entry.attempts < self.max_attempts
            {
                continue;
            }

            entry.state = JobState::DeadLetter;
            entry.lease = None;
            entry
                .last_error
                .get_or_insert_with(|| "lease expired on final attempt".to_string());
            tracing::warn!(
                job_id = %entry.id,
                dedup_key = %entry.dedup_key,
                "Redaction job exceeded max attempts, moved to dead letter"
            );
            dead.push(DeadLetter {
                job_id: entry.id.to_string(),
                body: entry.body.clone(),
            });
        }

        Ok(dead)
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn notifier(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }
}
