//! Phrase redaction

mod literal;
mod phrases;
mod redactor;

pub use literal::replace_literal_ignore_case;
pub use phrases::prepare_phrases;
pub use redactor::{RedactionReport, Redactor, RedactorConfig, DEFAULT_MATCH_TIMEOUT};
