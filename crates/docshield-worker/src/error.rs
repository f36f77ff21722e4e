//! Worker error types
//!
//! Every error that reaches the consumer answers `is_retryable()`: retryable
//! errors release the message for redelivery, the rest are acknowledged and
//! dropped with a log entry.

use uuid::Uuid;

use docshield_core::error::{AppError, LogLevel};
use docshield_core::models::StatusTransitionError;
use docshield_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] CodecError),

    #[error("Document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("Document {0} has no original content")]
    MissingContent(Uuid),

    #[error("Document {0} is already being processed")]
    ConcurrentProcessing(Uuid),

    #[error(transparent)]
    InvalidTransition(#[from] StatusTransitionError),

    #[error("Storage failure during {step}: {source}")]
    Storage {
        step: &'static str,
        #[source]
        source: StorageError,
    },

    #[error("Metadata store failure during {step}: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: AppError,
    },

    /// The redacted copy was uploaded but the document could not be updated.
    #[error("Redacted content stored at {redacted_key} but document update failed: {source}")]
    PartialSuccess {
        redacted_key: String,
        #[source]
        source: AppError,
    },

    #[error("Job deadline exceeded before {step}")]
    DeadlineExceeded { step: &'static str },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Malformed(_)
            | PipelineError::DocumentNotFound(_)
            | PipelineError::MissingContent(_)
            | PipelineError::ConcurrentProcessing(_) => false,
            PipelineError::Storage { source, .. } => source.is_retryable(),
            PipelineError::InvalidTransition(_)
            | PipelineError::Store { .. }
            | PipelineError::PartialSuccess { .. }
            | PipelineError::DeadlineExceeded { .. }
            | PipelineError::Internal(_) => true,
        }
    }

    /// Whether the document should be marked `Failed` before the error propagates.
    ///
    /// Not for malformed jobs and missing documents (nothing to mark) nor for
    /// concurrent processing (the other attempt owns the status).
    pub fn marks_document_failed(&self) -> bool {
        !matches!(
            self,
            PipelineError::Malformed(_)
                | PipelineError::DocumentNotFound(_)
                | PipelineError::ConcurrentProcessing(_)
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            PipelineError::Malformed(_) => "Malformed",
            PipelineError::DocumentNotFound(_) => "DocumentNotFound",
            PipelineError::MissingContent(_) => "MissingContent",
            PipelineError::ConcurrentProcessing(_) => "ConcurrentProcessing",
            PipelineError::InvalidTransition(_) => "InvalidTransition",
            PipelineError::Storage { .. } => "Storage",
            PipelineError::Store { .. } => "Store",
            PipelineError::PartialSuccess { .. } => "PartialSuccess",
            PipelineError::DeadlineExceeded { .. } => "DeadlineExceeded",
            PipelineError::Internal(_) => "Internal",
        }
    }

    pub fn log_level(&self) -> LogLevel {
        if self.is_retryable() {
            LogLevel::Error
        } else {
            LogLevel::Warn
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Job queue unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

impl PublishError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Unavailable(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("Document {0} is already being processed")]
    AlreadyProcessing(Uuid),

    #[error("Document {0} has no original content")]
    MissingContent(Uuid),

    #[error(transparent)]
    Store(#[from] AppError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl RequestError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RequestError::Store(e) => e.is_recoverable(),
            RequestError::Publish(e) => e.is_retryable(),
            _ => false,
        }
    }
}
