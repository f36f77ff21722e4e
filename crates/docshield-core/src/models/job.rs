use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The message exchanged over the job queue.
///
/// Immutable once published. Encoding and decoding live in the worker's codec,
/// which owns the wire rules (case-insensitive field names, nil id rejection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionJobPayload {
    pub document_id: Uuid,
    #[serde(default)]
    pub phrases_to_redact: Vec<String>,
}

impl RedactionJobPayload {
    pub fn new<I, S>(document_id: Uuid, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            document_id,
            phrases_to_redact: phrases.into_iter().map(Into::into).collect(),
        }
    }

    /// Queue deduplication key: one in-flight job per document.
    pub fn dedup_key(&self) -> String {
        self.document_id.to_string()
    }
}
