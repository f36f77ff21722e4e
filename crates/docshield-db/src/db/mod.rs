//! Database repositories for data access layer
//!
//! `document` holds the metadata store trait and its Postgres implementation,
//! `memory` an in-process store for local runs and tests, and `job` the
//! redaction job table backing the Postgres queue transport.
//
// Document metadata store
pub mod document;
pub mod memory;
//
// Redaction job queue table
pub mod job;
//
pub use document::{DocumentStore, PgDocumentRepository};
pub use job::{ClaimedJob, DeadLetteredJob, EnqueuedJob, RedactionJobRepository, NEW_JOB_CHANNEL};
pub use memory::MemoryDocumentStore;
