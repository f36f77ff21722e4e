//! Docshield Storage Library
//!
//! Object storage for original and redacted document content, behind the
//! [`Storage`] trait, with S3 and local filesystem implementations.
//!
//! # Storage key format
//!
//! All backends use the same key layout: `documents/{document_id}/{file_name}`.
//! The redacted copy of a document lives next to its original as
//! `documents/{document_id}/redacted_{file_name}`.
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use docshield_core::StorageBackend;
pub use factory::create_storage;
pub use keys::{generate_storage_key, REDACTED_CONTENT_TYPE};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
