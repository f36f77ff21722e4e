//! Redaction pipeline tests against in-memory storage and metadata store.

mod helpers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use uuid::Uuid;

use docshield_core::models::{DocumentStatus, RedactionJobPayload};
use docshield_db::DocumentStore;
use docshield_worker::{encode, JobDeadline, PipelineError};
use helpers::{generous_deadline, Harness};

#[tokio::test]
async fn test_successful_job_completes_document() {
    let harness = Harness::new();
    let document = harness
        .upload_document("letter.txt", "John Doe lives at 123 Main St")
        .await;
    let payload = RedactionJobPayload::new(document.id, ["John Doe", "123 Main St"]);

    let outcome = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap();

    let stored = harness.store.document(document.id).await;
    assert_eq!(stored.status, DocumentStatus::Completed);
    assert_eq!(stored.redacted_key.as_deref(), Some(outcome.redacted_key.as_str()));
    assert!(stored.updated_at.is_some());
    assert_eq!(outcome.replacements, 2);
    assert!(outcome.redacted_key.ends_with("redacted_letter.txt"));

    let redacted = harness.storage.get_text(&outcome.redacted_key).await.unwrap();
    assert_eq!(redacted, "******** lives at ***********");

    // The original is left untouched.
    let original = harness
        .storage
        .get_text(stored.original_key.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(original, "John Doe lives at 123 Main St");
}

#[tokio::test]
async fn test_process_delivery_decodes_wire_payload() {
    let harness = Harness::new();
    let document = harness.upload_document("memo.txt", "Call Alice today").await;
    let body = encode(&RedactionJobPayload::new(document.id, ["alice"]));

    let outcome = harness
        .pipeline
        .process_delivery(&body, 1, &generous_deadline())
        .await
        .unwrap();

    let redacted = harness.storage.get_text(&outcome.redacted_key).await.unwrap();
    assert_eq!(redacted, "Call ***** today");
}

#[tokio::test]
async fn test_empty_phrase_list_copies_content() {
    let harness = Harness::new();
    let document = harness.upload_document("notes.txt", "nothing secret").await;
    let payload = RedactionJobPayload::new(document.id, Vec::<String>::new());

    let outcome = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap();

    assert_eq!(outcome.replacements, 0);
    assert_eq!(
        harness.storage.get_text(&outcome.redacted_key).await.unwrap(),
        "nothing secret"
    );
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn test_malformed_body_is_dropped_without_touching_documents() {
    let harness = Harness::new();
    let document = harness.upload_document("a.txt", "text").await;

    let err = harness
        .pipeline
        .process_delivery(br#"{"phrasesToRedact": ["x"]}"#, 1, &generous_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Malformed(_)));
    assert!(!err.is_retryable());
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Uploaded
    );
}

#[tokio::test]
async fn test_missing_document_is_not_retried() {
    let harness = Harness::new();
    let payload = RedactionJobPayload::new(Uuid::new_v4(), ["secret"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::DocumentNotFound(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_missing_original_content_fails_document() {
    let harness = Harness::new();
    let document = docshield_core::models::Document::new("empty.txt", None);
    harness.store.create_document(&document).await.unwrap();
    let payload = RedactionJobPayload::new(document.id, ["secret"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::MissingContent(_)));
    assert!(!err.is_retryable());
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Failed
    );
}

#[tokio::test]
async fn test_upload_failure_marks_document_failed() {
    let harness = Harness::new();
    let document = harness.upload_document("report.txt", "Jane Roe").await;
    harness.storage.fail_uploads.store(true, Ordering::SeqCst);
    let payload = RedactionJobPayload::new(document.id, ["Jane"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Storage { step: "upload", .. }));
    assert!(err.is_retryable());

    let stored = harness.store.document(document.id).await;
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(stored.redacted_key.is_none());
}

#[tokio::test]
async fn test_download_failure_is_retryable() {
    let harness = Harness::new();
    let document = harness.upload_document("report.txt", "Jane Roe").await;
    harness.storage.fail_downloads.store(true, Ordering::SeqCst);
    let payload = RedactionJobPayload::new(document.id, ["Jane"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Storage { step: "download", .. }));
    assert!(err.is_retryable());
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Failed
    );
}

#[tokio::test]
async fn test_partial_success_is_retryable_and_retry_completes() {
    let harness = Harness::new();
    let document = harness.upload_document("contract.txt", "Signed by Bob").await;
    harness.store.fail_completed_saves.store(true, Ordering::SeqCst);
    let payload = RedactionJobPayload::new(document.id, ["Bob"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap_err();

    let redacted_key = match &err {
        PipelineError::PartialSuccess { redacted_key, .. } => redacted_key.clone(),
        other => panic!("expected partial success, got {other:?}"),
    };
    assert!(err.is_retryable());
    // Content is in storage but metadata never reached Completed.
    assert!(harness.storage.get(&redacted_key).await.is_some());
    let stored = harness.store.document(document.id).await;
    assert_ne!(stored.status, DocumentStatus::Completed);
    assert!(stored.redacted_key.is_none());

    harness.store.fail_completed_saves.store(false, Ordering::SeqCst);
    let outcome = harness
        .pipeline
        .process_job(&payload, 2, &generous_deadline())
        .await
        .unwrap();

    assert_eq!(outcome.redacted_key, redacted_key);
    assert_eq!(
        harness.storage.get_text(&redacted_key).await.unwrap(),
        "Signed by ***"
    );
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_marks_document_failed() {
    let harness = Harness::new();
    let document = harness.upload_document("slow.txt", "John Doe").await;
    *harness.storage.download_delay.write().await = Some(Duration::from_secs(60));
    let payload = RedactionJobPayload::new(document.id, ["John"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &JobDeadline::new(Duration::from_secs(5)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::DeadlineExceeded { step: "download" }
    ));
    assert!(err.is_retryable());
    let stored = harness.store.document(document.id).await;
    assert_eq!(stored.status, DocumentStatus::Failed);
    assert!(stored.redacted_key.is_none());
}

#[tokio::test]
async fn test_cancelled_deadline_stops_before_first_step() {
    let harness = Harness::new();
    let document = harness.upload_document("a.txt", "text").await;
    let deadline = generous_deadline();
    deadline.cancel();

    let err = harness
        .pipeline
        .process_job(&RedactionJobPayload::new(document.id, ["text"]), 1, &deadline)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::DeadlineExceeded {
            step: "load_document"
        }
    ));
}

#[tokio::test]
async fn test_first_attempt_refuses_document_already_processing() {
    let harness = Harness::new();
    let mut document = harness.upload_document("busy.txt", "secret").await;
    document
        .transition_to(DocumentStatus::Processing, chrono::Utc::now())
        .unwrap();
    harness.store.save_document(&document).await.unwrap();
    let payload = RedactionJobPayload::new(document.id, ["secret"]);

    let err = harness
        .pipeline
        .process_job(&payload, 1, &generous_deadline())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ConcurrentProcessing(_)));
    assert!(!err.is_retryable());
    // The attempt that owns the document keeps its status.
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Processing
    );
}

#[tokio::test]
async fn test_concurrency_guard_runs_before_content_check() {
    let harness = Harness::new();
    let mut document = docshield_core::models::Document::new("blank.txt", None);
    harness.store.create_document(&document).await.unwrap();
    document
        .transition_to(DocumentStatus::Processing, chrono::Utc::now())
        .unwrap();
    harness.store.save_document(&document).await.unwrap();

    let err = harness
        .pipeline
        .process_job(
            &RedactionJobPayload::new(document.id, ["secret"]),
            1,
            &generous_deadline(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::ConcurrentProcessing(_)));
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Processing
    );
}

#[tokio::test]
async fn test_redelivered_job_resumes_processing_document() {
    let harness = Harness::new();
    let mut document = harness.upload_document("crashed.txt", "secret plan").await;
    document
        .transition_to(DocumentStatus::Processing, chrono::Utc::now())
        .unwrap();
    harness.store.save_document(&document).await.unwrap();
    let payload = RedactionJobPayload::new(document.id, ["secret"]);

    let outcome = harness
        .pipeline
        .process_job(&payload, 2, &generous_deadline())
        .await
        .unwrap();

    assert_eq!(
        harness.storage.get_text(&outcome.redacted_key).await.unwrap(),
        "****** plan"
    );
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn test_completed_document_can_be_redacted_again() {
    let harness = Harness::new();
    let document = harness.upload_document("twice.txt", "alpha beta").await;

    let first = harness
        .pipeline
        .process_job(
            &RedactionJobPayload::new(document.id, ["alpha"]),
            1,
            &generous_deadline(),
        )
        .await
        .unwrap();
    let second = harness
        .pipeline
        .process_job(
            &RedactionJobPayload::new(document.id, ["beta"]),
            1,
            &generous_deadline(),
        )
        .await
        .unwrap();

    // Each pass redacts the original; the redacted copy is overwritten.
    assert_eq!(first.redacted_key, second.redacted_key);
    assert_eq!(
        harness.storage.get_text(&second.redacted_key).await.unwrap(),
        "alpha ****"
    );
}
