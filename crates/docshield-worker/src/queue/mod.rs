//! Job transports
//!
//! The [`JobQueue`] trait is what the publisher and the consumer see of the
//! queue: at-least-once delivery, deduplication by a caller-supplied key, a
//! visibility timeout after which unacknowledged messages are redelivered, and
//! a dead-letter path once a message exhausts its attempts.

mod memory;
mod postgres;
#[cfg(feature = "queue-sqs")]
mod sqs;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Notify;

pub use memory::{JobState, MemoryJobQueue};
pub use postgres::PgJobQueue;
#[cfg(feature = "queue-sqs")]
pub use sqs::SqsJobQueue;

/// Maximum delay in seconds before a released job becomes visible again. Caps
/// exponential backoff so that high attempt counts do not produce excessively
/// long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Backoff for a job released after its `attempt`-th delivery (exponential with cap).
#[inline]
pub fn compute_retry_backoff(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_secs(2_u64.pow(exponent).min(MAX_RETRY_BACKOFF_SECS))
}

/// A message to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingJob {
    /// Messages with the same key collapse while one is in flight.
    pub dedup_key: String,
    /// Ordering group for transports that support it.
    pub group_id: String,
    pub body: Vec<u8>,
}

/// Handle for a published job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReference {
    pub job_id: String,
    /// True when the request collapsed into an already queued job.
    pub deduplicated: bool,
}

/// A message handed to a consumer. It stays leased until acked or released,
/// or until the visibility timeout passes.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: String,
    pub receipt: String,
    pub body: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
}

/// A message that used its last attempt without being settled, typically
/// because the consumer holding its final lease died.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job_id: String,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: OutgoingJob) -> Result<JobReference>;

    /// Lease up to `max` visible messages. May return fewer, or none.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Remove a processed message.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Hand a message back for redelivery after a backoff.
    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<()>;

    /// Dead-letter messages whose final lease expired and hand them over once,
    /// so the consumer can settle the documents they left behind.
    async fn collect_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str;

    /// Signalled when new work may be available, for transports that can push.
    fn notifier(&self) -> Option<Arc<Notify>> {
        None
    }
}
