//! Error types module
//!
//! `AppError` is the error type of the metadata store. Pipeline-specific
//! errors live in the worker crate and wrap this one.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Warning level - for dropped or unprocessable work
    Warn,
    /// Error level - for unexpected failures
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store could not be reached.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        match err {
            SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
                AppError::Unavailable(err.to_string())
            }
            err => AppError::Database(err),
        }
    }
}

impl AppError {
    /// Whether repeating the same operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Database(_) | AppError::Unavailable(_) => true,
            AppError::Conflict(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_not_recoverable() {
        let err = AppError::Conflict("duplicate id".to_string());
        assert!(!err.is_recoverable());
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_pool_exhaustion_is_unavailable() {
        let err: AppError = SqlxError::PoolTimedOut.into();
        assert!(matches!(err, AppError::Unavailable(_)));
        assert!(err.is_recoverable());
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_query_errors_stay_database_errors() {
        let err: AppError = SqlxError::RowNotFound.into();
        assert!(matches!(err, AppError::Database(_)));
        assert!(err.is_recoverable());
    }
}
