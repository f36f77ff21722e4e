use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use docshield_core::error::AppError;
use docshield_core::models::Document;

/// Metadata store for documents
///
/// The redaction pipeline reads and mutates documents through this trait only,
/// so it can run against Postgres or an in-memory store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get a document by ID
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, AppError>;

    /// Insert a new document. Fails with [`AppError::Conflict`] if the ID exists.
    async fn create_document(&self, document: &Document) -> Result<(), AppError>;

    /// Create or update a document
    async fn save_document(&self, document: &Document) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentRepository {
    #[tracing::instrument(skip(self), fields(db.table = "documents", db.operation = "select"))]
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, AppError> {
        let document = sqlx::query_as::<Postgres, Document>(
            r#"
            SELECT id, original_file_name, status, created_at, updated_at,
                   original_key, redacted_key
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }

    #[tracing::instrument(
        skip(self, document),
        fields(document_id = %document.id, db.table = "documents", db.operation = "insert")
    )]
    async fn create_document(&self, document: &Document) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                id, original_file_name, status, created_at, updated_at,
                original_key, redacted_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document.id)
        .bind(&document.original_file_name)
        .bind(document.status)
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(&document.original_key)
        .bind(&document.redacted_key)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(document_id = %document.id, "Document created");
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("Document {} already exists", document.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(
        skip(self, document),
        fields(document_id = %document.id, status = %document.status, db.table = "documents", db.operation = "upsert")
    )]
    async fn save_document(&self, document: &Document) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO documents (
                id, original_file_name, status, created_at, updated_at,
                original_key, redacted_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                original_file_name = EXCLUDED.original_file_name,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                original_key = EXCLUDED.original_key,
                redacted_key = EXCLUDED.redacted_key
            "#,
        )
        .bind(document.id)
        .bind(&document.original_file_name)
        .bind(document.status)
        .bind(document.created_at)
        .bind(document.updated_at)
        .bind(&document.original_key)
        .bind(&document.redacted_key)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            document_id = %document.id,
            status = %document.status,
            "Document saved"
        );

        Ok(())
    }
}
