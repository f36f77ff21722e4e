//! Document status machine
//!
//! ```text
//! Uploaded ──► Processing ──► Completed
//!    │             │              │
//!    │             ▼              │
//!    └────────►  Failed  ◄────────┘
//! ```
//!
//! `Completed` and `Failed` end a job attempt but are not dead states: both
//! may re-enter `Processing` when the document is resubmitted. `Failed` is
//! reachable from every state because a job may only regress a document to
//! `Failed`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "document_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Whether the status machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::{Completed, Failed, Processing, Uploaded};

        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Completed, Processing)
                | (Failed, Processing)
                | (Processing, Completed)
                | (_, Failed)
        )
    }

    /// `Completed` and `Failed` end a job attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// A new redaction request may only be enqueued when no job owns the document.
    pub fn accepts_new_job(self) -> bool {
        self != DocumentStatus::Processing
    }
}

impl Display for DocumentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DocumentStatus::Uploaded => write!(f, "uploaded"),
            DocumentStatus::Processing => write!(f, "processing"),
            DocumentStatus::Completed => write!(f, "completed"),
            DocumentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid document status: {}", s)),
        }
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Illegal document status transition: {from} -> {to}")]
pub struct StatusTransitionError {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}
