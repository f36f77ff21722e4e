use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::{DocumentStatus, StatusTransitionError};

/// An uploaded document and the state of its redaction.
///
/// Owned by the metadata store. The pipeline mutates it only through
/// [`Document::transition_to`] and [`Document::complete`], which keep
/// `redacted_key` set if and only if the status is `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub original_file_name: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub original_key: Option<String>,
    pub redacted_key: Option<String>,
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for Document {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Document {
            id: row.try_get("id")?,
            original_file_name: row.try_get("original_file_name")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            original_key: row.try_get("original_key")?,
            redacted_key: row.try_get("redacted_key")?,
        })
    }
}

impl Document {
    /// A freshly uploaded document.
    pub fn new(original_file_name: impl Into<String>, original_key: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            original_file_name: original_file_name.into(),
            status: DocumentStatus::Uploaded,
            created_at: Utc::now(),
            updated_at: None,
            original_key,
            redacted_key: None,
        }
    }

    /// Move to `next`, stamping `updated_at`.
    ///
    /// `Completed` is rejected here; use [`Document::complete`] so the redacted
    /// key is always supplied with it.
    pub fn transition_to(
        &mut self,
        next: DocumentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StatusTransitionError> {
        if next == DocumentStatus::Completed || !self.status.can_transition_to(next) {
            return Err(StatusTransitionError {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.redacted_key = None;
        self.updated_at = Some(now);
        Ok(())
    }

    /// Record a successful redaction.
    pub fn complete(
        &mut self,
        redacted_key: String,
        now: DateTime<Utc>,
    ) -> Result<(), StatusTransitionError> {
        if !self.status.can_transition_to(DocumentStatus::Completed) {
            return Err(StatusTransitionError {
                from: self.status,
                to: DocumentStatus::Completed,
            });
        }

        self.status = DocumentStatus::Completed;
        self.redacted_key = Some(redacted_key);
        self.updated_at = Some(now);
        Ok(())
    }

    /// Refresh `updated_at` without changing status (resumed attempts).
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = Some(now);
    }

    pub fn has_original_content(&self) -> bool {
        self.original_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Name the redacted copy is stored under.
    pub fn redacted_file_name(&self) -> String {
        format!("redacted_{}", self.original_file_name)
    }
}
