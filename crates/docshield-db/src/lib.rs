//! Docshield Database Layer
//!
//! This crate provides the document metadata store and the Postgres-backed
//! redaction job repository.

// Module declarations
pub mod db;

// Re-exports: Document store
pub use db::{DocumentStore, MemoryDocumentStore, PgDocumentRepository};

// Re-exports: Job repository
pub use db::{ClaimedJob, DeadLetteredJob, EnqueuedJob, RedactionJobRepository, NEW_JOB_CHANNEL};
