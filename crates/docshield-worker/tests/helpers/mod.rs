//! Test helpers: in-memory storage and a metadata store with injectable faults.
//!
//! Run from workspace root: `cargo test -p docshield-worker`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use docshield_core::error::AppError;
use docshield_core::models::{Document, DocumentStatus};
use docshield_core::StorageBackend;
use docshield_db::{DocumentStore, MemoryDocumentStore};
use docshield_storage::{generate_storage_key, Storage, StorageError, StorageResult};
use docshield_worker::{JobDeadline, PipelineConfig, RedactionPipeline};

/// Object storage held in a map, with switches to fail uploads or downloads.
#[derive(Default)]
pub struct FlakyStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    pub fail_uploads: AtomicBool,
    pub fail_downloads: AtomicBool,
    /// Delay applied to every download.
    pub download_delay: RwLock<Option<Duration>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: &str, data: &[u8]) {
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn get_text(&self, key: &str) -> Option<String> {
        self.get(key)
            .await
            .map(|bytes| String::from_utf8(bytes).expect("stored content is UTF-8"))
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn upload(
        &self,
        document_id: Uuid,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<String> {
        let key = generate_storage_key(document_id, file_name);
        self.upload_with_key(&key, data, content_type).await?;
        Ok(key)
    }

    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::UploadFailed("injected upload failure".to_string()));
        }
        self.put(storage_key, &data).await;
        Ok(())
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let delay = *self.download_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(StorageError::DownloadFailed(
                "injected download failure".to_string(),
            ));
        }
        self.get(storage_key)
            .await
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.objects.write().await.remove(storage_key);
        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        Ok(self.objects.read().await.contains_key(storage_key))
    }

    async fn get_presigned_url(
        &self,
        storage_key: &str,
        _expires_in: Duration,
    ) -> StorageResult<String> {
        Ok(format!("memory://{}", storage_key))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

/// Metadata store that can refuse to persist `Completed` documents.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryDocumentStore,
    pub fail_completed_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn status_of(&self, id: Uuid) -> DocumentStatus {
        self.inner
            .get_document(id)
            .await
            .expect("memory store never fails reads")
            .expect("document exists")
            .status
    }

    pub async fn document(&self, id: Uuid) -> Document {
        self.inner
            .get_document(id)
            .await
            .expect("memory store never fails reads")
            .expect("document exists")
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        self.inner.get_document(id).await
    }

    async fn create_document(&self, document: &Document) -> Result<(), AppError> {
        self.inner.create_document(document).await
    }

    async fn save_document(&self, document: &Document) -> Result<(), AppError> {
        if document.status == DocumentStatus::Completed
            && self.fail_completed_saves.load(Ordering::SeqCst)
        {
            return Err(AppError::Unavailable("injected store failure".to_string()));
        }
        self.inner.save_document(document).await
    }
}

/// Storage, store and pipeline wired together.
pub struct Harness {
    pub storage: Arc<FlakyStorage>,
    pub store: Arc<FlakyStore>,
    pub pipeline: Arc<RedactionPipeline>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig {
            cleanup_slack: Duration::from_secs(1),
            ..PipelineConfig::default()
        })
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let storage = Arc::new(FlakyStorage::new());
        let store = Arc::new(FlakyStore::new());
        let pipeline = Arc::new(RedactionPipeline::new(
            store.clone(),
            storage.clone(),
            config,
        ));
        Self {
            storage,
            store,
            pipeline,
        }
    }

    /// Store `content` as the original of a new `Uploaded` document.
    pub async fn upload_document(&self, file_name: &str, content: &str) -> Document {
        let mut document = Document::new(file_name, None);
        let key = generate_storage_key(document.id, file_name);
        self.storage.put(&key, content.as_bytes()).await;
        document.original_key = Some(key);
        self.store
            .create_document(&document)
            .await
            .expect("create document");
        document
    }
}

pub fn generous_deadline() -> JobDeadline {
    JobDeadline::new(Duration::from_secs(30))
}
