//! Data models for the redaction pipeline
//!
//! Each sub-module represents a specific feature area.

mod document;
mod job;
mod status;

pub use document::*;
pub use job::*;
pub use status::*;
