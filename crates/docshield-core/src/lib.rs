//! Docshield Core Library
//!
//! This crate provides the domain models, the document status machine, error
//! types and configuration shared by every Docshield component.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, LogFormat, QueueBackend, WorkerConfig};
pub use error::{AppError, LogLevel};
pub use models::{Document, DocumentStatus, RedactionJobPayload, StatusTransitionError};
pub use storage_types::StorageBackend;
