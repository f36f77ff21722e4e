//! Process setup
//!
//! Builds the shared pieces every command needs from [`Config`]: the pool
//! (with migrations applied), the document store, object storage and the job
//! queue.

pub mod database;
pub mod queue;
pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use docshield_core::Config;
use docshield_db::{DocumentStore, PgDocumentRepository};
use docshield_storage::Storage;
use docshield_worker::{
    JobPublisher, JobQueue, PipelineConfig, RedactionPipeline, RedactionRequestService,
};
use sqlx::PgPool;

pub struct AppContext {
    pub config: Config,
    pub pool: PgPool,
    pub store: Arc<dyn DocumentStore>,
    pub storage: Arc<dyn Storage>,
    pub queue: Arc<dyn JobQueue>,
}

impl AppContext {
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;

        let pool = database::setup_database(&config).await?;
        let storage = storage::setup_storage(&config).await?;
        let queue = queue::setup_queue(&config, &pool).await?;
        let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentRepository::new(pool.clone()));

        Ok(Self {
            config,
            pool,
            store,
            storage,
            queue,
        })
    }

    pub fn pipeline(&self) -> Arc<RedactionPipeline> {
        Arc::new(RedactionPipeline::new(
            self.store.clone(),
            self.storage.clone(),
            PipelineConfig::from_config(&self.config),
        ))
    }

    pub fn request_service(&self) -> RedactionRequestService {
        RedactionRequestService::new(self.store.clone(), JobPublisher::new(self.queue.clone()))
    }
}
