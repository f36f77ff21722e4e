//! Redaction pipeline
//!
//! Runs one job: load the document, mark it `Processing`, download the
//! original, redact, upload the result and mark it `Completed`. Every step is
//! an overwrite, so a redelivered job can run the whole sequence again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use docshield_core::config::Config;
use docshield_core::models::{DocumentStatus, RedactionJobPayload};
use docshield_db::DocumentStore;
use docshield_processing::{RedactionReport, Redactor, RedactorConfig};
use docshield_storage::{Storage, REDACTED_CONTENT_TYPE};

use crate::codec;
use crate::deadline::JobDeadline;
use crate::error::PipelineError;

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub document_id: Uuid,
    pub redacted_key: String,
    pub replacements: usize,
    pub fallbacks: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Time allowed for the best-effort `Failed` update after an error.
    pub cleanup_slack: Duration,
    pub redactor: RedactorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cleanup_slack: Duration::from_secs(5),
            redactor: RedactorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cleanup_slack: config.job_cleanup_slack(),
            redactor: RedactorConfig::default().with_match_timeout(config.pattern_match_timeout()),
        }
    }
}

pub struct RedactionPipeline {
    store: Arc<dyn DocumentStore>,
    storage: Arc<dyn Storage>,
    redactor: Arc<Redactor>,
    cleanup_slack: Duration,
}

impl RedactionPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        storage: Arc<dyn Storage>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            storage,
            redactor: Arc::new(Redactor::with_config(config.redactor)),
            cleanup_slack: config.cleanup_slack,
        }
    }

    /// Decode a queue message and run it.
    pub async fn process_delivery(
        &self,
        body: &[u8],
        attempt: u32,
        deadline: &JobDeadline,
    ) -> Result<JobOutcome, PipelineError> {
        let payload = codec::decode(body).map_err(|e| {
            tracing::warn!(error = %e, attempt = attempt, "Dropping unprocessable redaction job");
            PipelineError::from(e)
        })?;

        self.process_job(&payload, attempt, deadline).await
    }

    /// Run a decoded job. On failure the document is marked `Failed` (best
    /// effort) before the original error is returned.
    #[tracing::instrument(
        skip(self, payload, deadline),
        fields(document_id = %payload.document_id, attempt = attempt)
    )]
    pub async fn process_job(
        &self,
        payload: &RedactionJobPayload,
        attempt: u32,
        deadline: &JobDeadline,
    ) -> Result<JobOutcome, PipelineError> {
        let start = Instant::now();

        match self.run_steps(payload, attempt, deadline).await {
            Ok(outcome) => {
                tracing::info!(
                    document_id = %outcome.document_id,
                    redacted_key = %outcome.redacted_key,
                    replacements = outcome.replacements,
                    fallbacks = outcome.fallbacks,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Document redacted"
                );
                Ok(outcome)
            }
            Err(err) => {
                if err.marks_document_failed() {
                    self.mark_failed_best_effort(payload.document_id).await;
                }
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        payload: &RedactionJobPayload,
        attempt: u32,
        deadline: &JobDeadline,
    ) -> Result<JobOutcome, PipelineError> {
        let document_id = payload.document_id;

        let mut document = deadline
            .run("load_document", self.store.get_document(document_id))
            .await?
            .map_err(|source| PipelineError::Store {
                step: "load_document",
                source,
            })?
            .ok_or_else(|| {
                tracing::warn!(document_id = %document_id, "Job references a missing document, dropping");
                PipelineError::DocumentNotFound(document_id)
            })?;

        // A redelivered job finding `Processing` is resuming its own crashed attempt.
        let resuming = document.status == DocumentStatus::Processing;
        if resuming && attempt <= 1 {
            tracing::warn!(
                document_id = %document_id,
                "Document already processing, refusing concurrent job"
            );
            return Err(PipelineError::ConcurrentProcessing(document_id));
        }

        let original_key = match document.original_key.as_deref() {
            Some(key) if document.has_original_content() => key.to_string(),
            _ => return Err(PipelineError::MissingContent(document_id)),
        };

        if resuming {
            tracing::info!(document_id = %document_id, attempt = attempt, "Resuming interrupted redaction");
            document.touch(Utc::now());
        } else {
            document.transition_to(DocumentStatus::Processing, Utc::now())?;
        }

        deadline
            .run("mark_processing", self.store.save_document(&document))
            .await?
            .map_err(|source| PipelineError::Store {
                step: "mark_processing",
                source,
            })?;

        let original = deadline
            .run("download", self.storage.download(&original_key))
            .await?
            .map_err(|source| PipelineError::Storage {
                step: "download",
                source,
            })?;

        let (redacted, report) = self
            .redact(original, payload.phrases_to_redact.clone(), deadline)
            .await?;

        let redacted_key = deadline
            .run(
                "upload",
                self.storage.upload(
                    document_id,
                    &document.redacted_file_name(),
                    REDACTED_CONTENT_TYPE,
                    redacted.into_bytes(),
                ),
            )
            .await?
            .map_err(|source| PipelineError::Storage {
                step: "upload",
                source,
            })?;

        document.complete(redacted_key.clone(), Utc::now())?;

        deadline
            .run("mark_completed", self.store.save_document(&document))
            .await?
            .map_err(|source| {
                tracing::error!(
                    document_id = %document_id,
                    redacted_key = %redacted_key,
                    error = %source,
                    "Redacted content uploaded but document update failed"
                );
                PipelineError::PartialSuccess {
                    redacted_key: redacted_key.clone(),
                    source,
                }
            })?;

        Ok(JobOutcome {
            document_id,
            redacted_key,
            replacements: report.replacements,
            fallbacks: report.fallbacks,
        })
    }

    /// Run the redactor on a blocking thread. Content is treated as UTF-8 text.
    async fn redact(
        &self,
        original: Vec<u8>,
        phrases: Vec<String>,
        deadline: &JobDeadline,
    ) -> Result<(String, RedactionReport), PipelineError> {
        let redactor = self.redactor.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let content = String::from_utf8_lossy(&original);
            redactor.redact_with_report(&content, &phrases)
        });

        deadline
            .run("redact", handle)
            .await?
            .map_err(|e| PipelineError::Internal(format!("Redaction task failed: {}", e)))
    }

    /// Settle a job the queue dead-lettered after its last lease expired.
    ///
    /// The attempt that held the lease never finished, so a document it left
    /// in `Processing` is marked `Failed`. Any other status is left alone.
    pub async fn abandon_job(&self, body: &[u8]) {
        let payload = match codec::decode(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Dead-lettered job is unprocessable, nothing to settle");
                return;
            }
        };
        let document_id = payload.document_id;

        match self.store.get_document(document_id).await {
            Ok(Some(document)) if document.status == DocumentStatus::Processing => {
                tracing::warn!(
                    document_id = %document_id,
                    "Redaction job abandoned while processing"
                );
                self.mark_failed_best_effort(document_id).await;
            }
            Ok(_) => {
                tracing::debug!(document_id = %document_id, "Dead-lettered job left no document to settle");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    document_id = %document_id,
                    "Failed to load document for dead-lettered job"
                );
            }
        }
    }

    /// Reload the document and mark it `Failed`, within the cleanup slack.
    /// Secondary errors are logged, never returned.
    async fn mark_failed_best_effort(&self, document_id: Uuid) {
        let update = async {
            let Some(mut document) = self.store.get_document(document_id).await? else {
                return Ok::<bool, anyhow::Error>(false);
            };
            document.transition_to(DocumentStatus::Failed, Utc::now())?;
            self.store.save_document(&document).await?;
            Ok(true)
        };

        match tokio::time::timeout(self.cleanup_slack, update).await {
            Ok(Ok(true)) => {
                tracing::warn!(document_id = %document_id, "Document marked failed");
            }
            Ok(Ok(false)) => {
                tracing::warn!(document_id = %document_id, "Document vanished before it could be marked failed");
            }
            Ok(Err(e)) => {
                tracing::error!(
                    error = %e,
                    document_id = %document_id,
                    "Failed to mark document as failed"
                );
            }
            Err(_) => {
                tracing::error!(
                    document_id = %document_id,
                    cleanup_slack_ms = self.cleanup_slack.as_millis() as u64,
                    "Timed out marking document as failed"
                );
            }
        }
    }
}
