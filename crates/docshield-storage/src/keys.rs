//! Shared key generation for storage backends.
//!
//! Key format: `documents/{document_id}/{file_name}`.

use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Content type of redacted output. Content is always handled as plain text.
pub const REDACTED_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const KEY_PREFIX: &str = "documents";

/// Generate a storage key for the given document and file name.
///
/// Path separators in `file_name` are replaced so the name stays a single
/// key segment. All backends must use this format for consistency.
pub fn generate_storage_key(document_id: Uuid, file_name: &str) -> String {
    let segment: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}/{}/{}", KEY_PREFIX, document_id, segment)
}

/// Reject keys that could escape the storage root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() || storage_key.contains("..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(storage_key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_scoped_to_document() {
        let id = Uuid::new_v4();
        assert_eq!(
            generate_storage_key(id, "redacted_report.txt"),
            format!("documents/{}/redacted_report.txt", id)
        );
    }

    #[test]
    fn test_separators_in_file_name_are_flattened() {
        let id = Uuid::new_v4();
        let key = generate_storage_key(id, "../etc/passwd");
        assert_eq!(key, format!("documents/{}/.._etc_passwd", id));
        assert!(validate_key(&key).is_err());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("documents/a/b.txt").is_ok());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("documents/../../x").is_err());
        assert!(validate_key("").is_err());
    }
}
