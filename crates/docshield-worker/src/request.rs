use std::sync::Arc;

use uuid::Uuid;

use docshield_core::models::{DocumentStatus, RedactionJobPayload};
use docshield_db::DocumentStore;

use crate::error::RequestError;
use crate::publisher::JobPublisher;
use crate::queue::JobReference;

/// Checks a redaction request against the document before publishing it.
pub struct RedactionRequestService {
    store: Arc<dyn DocumentStore>,
    publisher: JobPublisher,
}

impl RedactionRequestService {
    pub fn new(store: Arc<dyn DocumentStore>, publisher: JobPublisher) -> Self {
        Self { store, publisher }
    }

    /// Publish a redaction job for `document_id`.
    ///
    /// Refused while the document is `Processing`, and for documents that do
    /// not exist or have no stored original.
    #[tracing::instrument(skip(self, phrases), fields(document_id = %document_id))]
    pub async fn request_redaction(
        &self,
        document_id: Uuid,
        phrases: Vec<String>,
    ) -> Result<JobReference, RequestError> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or(RequestError::DocumentNotFound(document_id))?;

        if document.status == DocumentStatus::Processing {
            tracing::info!(document_id = %document_id, "Redaction refused, document is processing");
            return Err(RequestError::AlreadyProcessing(document_id));
        }

        if !document.has_original_content() {
            return Err(RequestError::MissingContent(document_id));
        }

        let payload = RedactionJobPayload::new(document_id, phrases);
        Ok(self.publisher.publish(&payload).await?)
    }
}
