use std::sync::Arc;

use docshield_core::models::RedactionJobPayload;

use crate::codec;
use crate::error::PublishError;
use crate::queue::{JobQueue, JobReference, OutgoingJob};

/// Enqueues redaction jobs, one in flight per document.
///
/// The document id is both the dedup key and the ordering group, so repeated
/// requests for a document collapse into the job already queued for it.
#[derive(Clone)]
pub struct JobPublisher {
    queue: Arc<dyn JobQueue>,
}

impl JobPublisher {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    #[tracing::instrument(skip(self, payload), fields(document_id = %payload.document_id))]
    pub async fn publish(&self, payload: &RedactionJobPayload) -> Result<JobReference, PublishError> {
        if payload.document_id.is_nil() {
            return Err(PublishError::InvalidPayload(
                "document id must not be nil".to_string(),
            ));
        }

        let job = OutgoingJob {
            dedup_key: payload.dedup_key(),
            group_id: payload.dedup_key(),
            body: codec::encode(payload),
        };

        let reference = self.queue.enqueue(job).await.map_err(|e| {
            tracing::error!(
                error = %e,
                document_id = %payload.document_id,
                "Failed to publish redaction job"
            );
            PublishError::Unavailable(e)
        })?;

        tracing::info!(
            job_id = %reference.job_id,
            document_id = %payload.document_id,
            phrase_count = payload.phrases_to_redact.len(),
            deduplicated = reference.deduplicated,
            queue = self.queue.name(),
            "Redaction job published"
        );

        Ok(reference)
    }
}
