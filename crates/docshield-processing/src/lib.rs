//! Docshield content processing
//!
//! Pure text transformations applied by the redaction worker. Nothing in this
//! crate performs I/O.

pub mod redaction;

pub use redaction::{RedactionReport, Redactor, RedactorConfig};
