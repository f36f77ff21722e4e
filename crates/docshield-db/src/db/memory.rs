use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use docshield_core::error::AppError;
use docshield_core::models::Document;

use super::document::DocumentStore;

/// In-process document store for local runs and tests.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<Uuid, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn create_document(&self, document: &Document) -> Result<(), AppError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&document.id) {
            return Err(AppError::Conflict(format!(
                "Document {} already exists",
                document.id
            )));
        }
        documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn save_document(&self, document: &Document) -> Result<(), AppError> {
        self.documents
            .write()
            .await
            .insert(document.id, document.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docshield_core::models::DocumentStatus;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("a.txt", Some("documents/a/a.txt".to_string()));

        store.create_document(&document).await.unwrap();

        let loaded = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(loaded, document);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_existing_id_conflicts() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("a.txt", None);
        store.create_document(&document).await.unwrap();

        let err = store.create_document(&document).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = MemoryDocumentStore::new();
        let mut document = Document::new("a.txt", Some("k".to_string()));
        store.save_document(&document).await.unwrap();

        document
            .transition_to(DocumentStatus::Processing, Utc::now())
            .unwrap();
        store.save_document(&document).await.unwrap();

        let loaded = store.get_document(document.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Processing);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let store = MemoryDocumentStore::new();
        assert!(store.get_document(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }
}
