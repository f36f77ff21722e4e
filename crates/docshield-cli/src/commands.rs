//! Operator commands
//!
//! Each command takes the store and storage as trait objects so it runs the
//! same against Postgres/S3 and the in-memory/local backends.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use uuid::Uuid;

use docshield_core::models::{Document, DocumentStatus};
use docshield_db::DocumentStore;
use docshield_processing::{RedactionReport, Redactor, RedactorConfig};
use docshield_storage::{Storage, REDACTED_CONTENT_TYPE};

const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);
const ORIGINAL_CONTENT_TYPE: &str = "application/octet-stream";

/// What `status` prints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReport {
    #[serde(flatten)]
    pub document: Document,
    /// Link to the redacted copy, only once the document is `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redacted_url: Option<String>,
}

/// Store a file as the original of a new `Uploaded` document.
pub async fn register_document(
    store: &dyn DocumentStore,
    storage: &dyn Storage,
    path: &Path,
    name: Option<String>,
) -> Result<Document> {
    let file_name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Cannot derive a file name from the path; pass --name")?,
    };
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut document = Document::new(file_name, None);
    let key = storage
        .upload(
            document.id,
            &document.original_file_name,
            ORIGINAL_CONTENT_TYPE,
            data,
        )
        .await
        .context("Failed to store original content")?;
    document.original_key = Some(key.clone());

    if let Err(e) = store.create_document(&document).await {
        if let Err(cleanup) = storage.delete(&key).await {
            tracing::warn!(error = %cleanup, storage_key = %key, "Failed to remove orphaned upload");
        }
        return Err(e).context("Failed to record document");
    }

    tracing::info!(document_id = %document.id, storage_key = %key, "Document registered");
    Ok(document)
}

pub async fn document_report(
    store: &dyn DocumentStore,
    storage: &dyn Storage,
    document_id: Uuid,
) -> Result<DocumentReport> {
    let document = store
        .get_document(document_id)
        .await?
        .with_context(|| format!("Document {} not found", document_id))?;

    let redacted_url = match (&document.status, document.redacted_key.as_deref()) {
        (DocumentStatus::Completed, Some(key)) => {
            Some(storage.get_presigned_url(key, DOWNLOAD_URL_TTL).await?)
        }
        _ => None,
    };

    Ok(DocumentReport {
        document,
        redacted_url,
    })
}

/// Fetch the redacted copy of a `Completed` document.
pub async fn download_redacted(
    store: &dyn DocumentStore,
    storage: &dyn Storage,
    document_id: Uuid,
) -> Result<Vec<u8>> {
    let document = store
        .get_document(document_id)
        .await?
        .with_context(|| format!("Document {} not found", document_id))?;

    match (document.status, document.redacted_key.as_deref()) {
        (DocumentStatus::Completed, Some(key)) => Ok(storage.download(key).await?),
        (status, _) => bail!(
            "Document {} has no redacted copy (status: {})",
            document_id,
            status
        ),
    }
}

/// Redact a local file without touching the queue or the store.
pub async fn redact_file(
    path: &Path,
    phrases: &[String],
    match_timeout: Duration,
) -> Result<(String, RedactionReport)> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let content = String::from_utf8_lossy(&data).into_owned();
    let redactor = Redactor::with_config(RedactorConfig::default().with_match_timeout(match_timeout));

    Ok(redactor.redact_with_report(&content, phrases))
}
