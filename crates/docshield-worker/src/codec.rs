//! Job payload wire format
//!
//! A flat JSON object `{"documentId": "<uuid>", "phrasesToRedact": ["..."]}`.
//! Field names are written in lower camel case and read case-insensitively;
//! unknown fields are ignored.

use serde_json::{Map, Value};
use uuid::Uuid;

use docshield_core::models::RedactionJobPayload;

use crate::error::CodecError;

const DOCUMENT_ID_FIELD: &str = "documentId";
const PHRASES_FIELD: &str = "phrasesToRedact";

pub fn encode(payload: &RedactionJobPayload) -> Vec<u8> {
    serde_json::json!({
        DOCUMENT_ID_FIELD: payload.document_id.to_string(),
        PHRASES_FIELD: payload.phrases_to_redact,
    })
    .to_string()
    .into_bytes()
}

pub fn decode(bytes: &[u8]) -> Result<RedactionJobPayload, CodecError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::MalformedPayload(format!("body is not valid JSON: {}", e)))?;

    let Value::Object(fields) = value else {
        return Err(CodecError::MalformedPayload(
            "body is not a JSON object".to_string(),
        ));
    };

    let document_id = match field(&fields, DOCUMENT_ID_FIELD)? {
        Some(Value::String(raw)) => Uuid::parse_str(raw.trim()).map_err(|e| {
            CodecError::MalformedPayload(format!("{} is not a valid id: {}", DOCUMENT_ID_FIELD, e))
        })?,
        Some(Value::Null) | None => {
            return Err(CodecError::MalformedPayload(format!(
                "{} is missing",
                DOCUMENT_ID_FIELD
            )))
        }
        Some(_) => {
            return Err(CodecError::MalformedPayload(format!(
                "{} must be a string",
                DOCUMENT_ID_FIELD
            )))
        }
    };

    if document_id.is_nil() {
        return Err(CodecError::MalformedPayload(format!(
            "{} is nil",
            DOCUMENT_ID_FIELD
        )));
    }

    let phrases_to_redact = match field(&fields, PHRASES_FIELD)? {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(phrase) => Ok(phrase.clone()),
                _ => Err(CodecError::MalformedPayload(format!(
                    "{} must contain only strings",
                    PHRASES_FIELD
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(CodecError::MalformedPayload(format!(
                "{} must be an array",
                PHRASES_FIELD
            )))
        }
    };

    Ok(RedactionJobPayload {
        document_id,
        phrases_to_redact,
    })
}

/// Look up `name` ignoring ASCII case. Two keys differing only in case are ambiguous.
fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<Option<&'a Value>, CodecError> {
    let mut matches = fields
        .iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value);

    let found = matches.next();
    if matches.next().is_some() {
        return Err(CodecError::MalformedPayload(format!(
            "{} appears more than once",
            name
        )));
    }
    Ok(found)
}
