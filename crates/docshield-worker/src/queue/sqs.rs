use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;

use super::{compute_retry_backoff, DeadLetter, Delivery, JobQueue, JobReference, OutgoingJob};

// SQS caps a single receive at 10 messages.
const MAX_RECEIVE_BATCH: usize = 10;
const RECEIVE_WAIT_SECONDS: i32 = 1;

/// Transport backed by an SQS FIFO queue.
///
/// Deduplication uses the queue's deduplication window keyed by
/// `MessageDeduplicationId`; dead-lettering is the queue's redrive policy.
/// When the redrive target is configured, its messages are drained by
/// `collect_dead_letters`.
pub struct SqsJobQueue {
    client: Client,
    queue_url: String,
    dead_letter_queue_url: Option<String>,
    visibility_timeout: Duration,
}

impl SqsJobQueue {
    pub async fn new(
        queue_url: String,
        dead_letter_queue_url: Option<String>,
        region: Option<String>,
        visibility_timeout: Duration,
    ) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;

        Self {
            client: Client::new(&config),
            queue_url,
            dead_letter_queue_url,
            visibility_timeout,
        }
    }
}

#[async_trait]
impl JobQueue for SqsJobQueue {
    async fn enqueue(&self, job: OutgoingJob) -> Result<JobReference> {
        let body = String::from_utf8(job.body).context("Job body is not UTF-8")?;

        let output = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .message_group_id(&job.group_id)
            .message_deduplication_id(&job.dedup_key)
            .send()
            .await
            .context("Failed to send message to SQS")?;

        let job_id = output.message_id().unwrap_or_default().to_string();
        tracing::info!(job_id = %job_id, dedup_key = %job.dedup_key, "Redaction job enqueued");

        // SQS does not report whether the message was absorbed by the dedup window.
        Ok(JobReference {
            job_id,
            deduplicated: false,
        })
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max.clamp(1, MAX_RECEIVE_BATCH) as i32)
            .visibility_timeout(self.visibility_timeout.as_secs() as i32)
            .wait_time_seconds(RECEIVE_WAIT_SECONDS)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .context("Failed to receive messages from SQS")?;

        let mut deliveries = Vec::new();
        for message in output.messages() {
            let (Some(receipt), Some(job_id)) = (message.receipt_handle(), message.message_id())
            else {
                tracing::warn!("SQS message without receipt handle or id, skipping");
                continue;
            };

            let attempt = message
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse::<u32>().ok())
                .unwrap_or(1);

            deliveries.push(Delivery {
                job_id: job_id.to_string(),
                receipt: receipt.to_string(),
                body: message.body().unwrap_or_default().as_bytes().to_vec(),
                attempt,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&delivery.receipt)
            .send()
            .await
            .context("Failed to delete SQS message")?;
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let delay = compute_retry_backoff(delivery.attempt);
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&delivery.receipt)
            .visibility_timeout(delay.as_secs() as i32)
            .send()
            .await
            .context("Failed to change SQS message visibility")?;

        tracing::debug!(
            job_id = %delivery.job_id,
            reason = %reason,
            delay_secs = delay.as_secs(),
            "SQS message released"
        );
        Ok(())
    }

    async fn collect_dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let Some(dead_letter_queue_url) = self.dead_letter_queue_url.as_deref() else {
            return Ok(Vec::new());
        };

        let output = self
            .client
            .receive_message()
            .queue_url(dead_letter_queue_url)
            .max_number_of_messages(MAX_RECEIVE_BATCH as i32)
            .wait_time_seconds(0)
            .send()
            .await
            .context("Failed to receive messages from SQS dead-letter queue")?;

        let mut dead = Vec::new();
        for message in output.messages() {
            let (Some(receipt), Some(job_id)) = (message.receipt_handle(), message.message_id())
            else {
                continue;
            };

            self.client
                .delete_message()
                .queue_url(dead_letter_queue_url)
                .receipt_handle(receipt)
                .send()
                .await
                .context("Failed to delete SQS dead-letter message")?;

            tracing::warn!(job_id = %job_id, "Redaction job exceeded max attempts, moved to dead letter");
            dead.push(DeadLetter {
                job_id: job_id.to_string(),
                body: message.body().unwrap_or_default().as_bytes().to_vec(),
            });
        }

        Ok(dead)
    }

    fn name(&self) -> &'static str {
        "sqs"
    }
}
