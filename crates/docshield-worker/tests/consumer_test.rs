//! Publisher, request checks and worker pool over the in-memory queue.

mod helpers;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use docshield_core::models::{Document, DocumentStatus, RedactionJobPayload};
use docshield_db::DocumentStore;
use docshield_worker::queue::JobState;
use docshield_worker::{
    ConsumerConfig, Delivery, JobConsumer, JobPublisher, JobQueue, JobReference, MemoryJobQueue,
    OutgoingJob, PublishError, RedactionRequestService, RequestError,
};
use helpers::{generous_deadline, Harness};

fn memory_queue(max_attempts: u32) -> Arc<MemoryJobQueue> {
    Arc::new(
        MemoryJobQueue::new(Duration::from_secs(30), max_attempts)
            .with_retry_delay(Duration::ZERO),
    )
}

/// Transport whose broker cannot be reached.
struct UnreachableQueue;

#[async_trait]
impl JobQueue for UnreachableQueue {
    async fn enqueue(&self, _job: OutgoingJob) -> anyhow::Result<JobReference> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn receive(&self, _max: usize) -> anyhow::Result<Vec<Delivery>> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn ack(&self, _delivery: &Delivery) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("connection refused"))
    }

    async fn release(&self, _delivery: &Delivery, _reason: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("connection refused"))
    }

    fn name(&self) -> &'static str {
        "unreachable"
    }
}

fn fast_consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        max_concurrency: 2,
        poll_interval: Duration::from_millis(10),
        job_budget: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(1),
    }
}

async fn wait_for_status(harness: &Harness, id: Uuid, status: DocumentStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.store.status_of(id).await != status {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("document {id} never reached {status}"));
}

async fn wait_for_job(queue: &MemoryJobQueue, job_id: &str, state: JobState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.state(job_id).await != Some(state) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {job_id} never reached {state:?}"));
}

#[tokio::test]
async fn test_requested_redaction_is_processed_by_consumer() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let service = RedactionRequestService::new(
        harness.store.clone(),
        JobPublisher::new(queue.clone()),
    );
    let document = harness
        .upload_document("letter.txt", "John Doe lives at 123 Main St")
        .await;

    let consumer = JobConsumer::start(queue.clone(), harness.pipeline.clone(), fast_consumer_config());
    let reference = service
        .request_redaction(
            document.id,
            vec!["John Doe".to_string(), "123 Main St".to_string()],
        )
        .await
        .unwrap();

    wait_for_status(&harness, document.id, DocumentStatus::Completed).await;
    wait_for_job(&queue, &reference.job_id, JobState::Completed).await;
    consumer.shutdown().await;

    let stored = harness.store.document(document.id).await;
    let redacted = harness
        .storage
        .get_text(stored.redacted_key.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(redacted, "******** lives at ***********");
}

#[tokio::test]
async fn test_repeated_requests_collapse_into_one_job() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let service = RedactionRequestService::new(
        harness.store.clone(),
        JobPublisher::new(queue.clone()),
    );
    let document = harness.upload_document("a.txt", "text").await;

    let first = service
        .request_redaction(document.id, vec!["text".to_string()])
        .await
        .unwrap();
    let second = service
        .request_redaction(document.id, vec!["other".to_string()])
        .await
        .unwrap();

    assert!(!first.deduplicated);
    assert!(second.deduplicated);
    assert_eq!(first.job_id, second.job_id);
    assert_eq!(queue.count(JobState::Pending).await, 1);
}

#[tokio::test]
async fn test_request_refused_while_processing() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let service = RedactionRequestService::new(
        harness.store.clone(),
        JobPublisher::new(queue.clone()),
    );
    let mut document = harness.upload_document("busy.txt", "text").await;
    document
        .transition_to(DocumentStatus::Processing, chrono::Utc::now())
        .unwrap();
    harness.store.save_document(&document).await.unwrap();

    let err = service
        .request_redaction(document.id, vec!["text".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(err, RequestError::AlreadyProcessing(_)));
    assert!(!err.is_retryable());
    assert_eq!(queue.count(JobState::Pending).await, 0);
}

#[tokio::test]
async fn test_request_refused_for_unknown_or_empty_documents() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let service = RedactionRequestService::new(
        harness.store.clone(),
        JobPublisher::new(queue.clone()),
    );

    let err = service
        .request_redaction(Uuid::new_v4(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::DocumentNotFound(_)));

    let empty = Document::new("empty.txt", None);
    harness.store.create_document(&empty).await.unwrap();
    let err = service
        .request_redaction(empty.id, vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, RequestError::MissingContent(_)));

    assert_eq!(queue.count(JobState::Pending).await, 0);
}

#[tokio::test]
async fn test_publisher_rejects_nil_document_id() {
    let queue = memory_queue(3);
    let publisher = JobPublisher::new(queue.clone());

    let err = publisher
        .publish(&RedactionJobPayload::new(Uuid::nil(), ["x"]))
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::InvalidPayload(_)));
    assert!(!err.is_retryable());
    assert_eq!(queue.count(JobState::Pending).await, 0);
}

#[tokio::test]
async fn test_unreachable_queue_surfaces_retryable_error() {
    let harness = Harness::new();
    let service = RedactionRequestService::new(
        harness.store.clone(),
        JobPublisher::new(Arc::new(UnreachableQueue)),
    );
    let document = harness.upload_document("a.txt", "text").await;

    let err = service
        .request_redaction(document.id, vec!["text".to_string()])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RequestError::Publish(PublishError::Unavailable(_))
    ));
    assert!(err.is_retryable());
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Uploaded
    );
}

#[tokio::test(start_paused = true)]
async fn test_crash_on_final_attempt_fails_document() {
    let harness = Harness::new();
    let queue = memory_queue(1);
    let service = RedactionRequestService::new(
        harness.store.clone(),
        JobPublisher::new(queue.clone()),
    );
    let mut document = harness.upload_document("crash.txt", "John Doe").await;
    let reference = service
        .request_redaction(document.id, vec!["John".to_string()])
        .await
        .unwrap();

    // The worker claims the job, marks the document and dies without settling.
    let _lost = queue.receive(1).await.unwrap().remove(0);
    document
        .transition_to(DocumentStatus::Processing, chrono::Utc::now())
        .unwrap();
    harness.store.save_document(&document).await.unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;

    JobConsumer::settle_dead_letters(queue.as_ref(), &harness.pipeline).await;

    assert_eq!(queue.state(&reference.job_id).await, Some(JobState::DeadLetter));
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Failed
    );

    let again = service
        .request_redaction(document.id, vec!["John".to_string()])
        .await
        .unwrap();
    assert!(!again.deduplicated);
    assert_ne!(again.job_id, reference.job_id);
}

#[tokio::test(start_paused = true)]
async fn test_dead_letter_before_processing_leaves_status_alone() {
    let harness = Harness::new();
    let queue = memory_queue(1);
    let document = harness.upload_document("early.txt", "text").await;
    let reference = JobPublisher::new(queue.clone())
        .publish(&RedactionJobPayload::new(document.id, ["text"]))
        .await
        .unwrap();

    // Lost before the document was touched.
    let _lost = queue.receive(1).await.unwrap().remove(0);
    tokio::time::advance(Duration::from_secs(31)).await;

    JobConsumer::settle_dead_letters(queue.as_ref(), &harness.pipeline).await;

    assert_eq!(queue.state(&reference.job_id).await, Some(JobState::DeadLetter));
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Uploaded
    );
}

#[tokio::test]
async fn test_malformed_message_is_acknowledged_and_dropped() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let reference = queue
        .enqueue(OutgoingJob {
            dedup_key: "garbage".to_string(),
            group_id: "garbage".to_string(),
            body: b"not json".to_vec(),
        })
        .await
        .unwrap();

    let delivery = queue.receive(1).await.unwrap().remove(0);
    JobConsumer::handle_delivery(
        queue.as_ref(),
        &harness.pipeline,
        delivery,
        generous_deadline(),
    )
    .await;

    assert_eq!(queue.state(&reference.job_id).await, Some(JobState::Completed));
}

#[tokio::test]
async fn test_retryable_failure_is_released_for_redelivery() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let document = harness.upload_document("report.txt", "Jane Roe").await;
    harness.storage.fail_uploads.store(true, Ordering::SeqCst);
    let reference = JobPublisher::new(queue.clone())
        .publish(&RedactionJobPayload::new(document.id, ["Jane"]))
        .await
        .unwrap();

    let delivery = queue.receive(1).await.unwrap().remove(0);
    JobConsumer::handle_delivery(
        queue.as_ref(),
        &harness.pipeline,
        delivery,
        generous_deadline(),
    )
    .await;

    assert_eq!(queue.state(&reference.job_id).await, Some(JobState::Pending));
    assert!(queue
        .last_error(&reference.job_id)
        .await
        .unwrap()
        .contains("upload"));
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Failed
    );

    // The redelivery succeeds once storage recovers.
    harness.storage.fail_uploads.store(false, Ordering::SeqCst);
    let redelivery = queue.receive(1).await.unwrap().remove(0);
    assert_eq!(redelivery.attempt, 2);
    JobConsumer::handle_delivery(
        queue.as_ref(),
        &harness.pipeline,
        redelivery,
        generous_deadline(),
    )
    .await;

    assert_eq!(queue.state(&reference.job_id).await, Some(JobState::Completed));
    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Completed
    );
}

#[tokio::test]
async fn test_persistent_failure_ends_in_dead_letter() {
    let harness = Harness::new();
    let queue = memory_queue(2);
    let document = harness.upload_document("report.txt", "Jane Roe").await;
    harness.storage.fail_downloads.store(true, Ordering::SeqCst);
    let reference = JobPublisher::new(queue.clone())
        .publish(&RedactionJobPayload::new(document.id, ["Jane"]))
        .await
        .unwrap();

    let consumer = JobConsumer::start(queue.clone(), harness.pipeline.clone(), fast_consumer_config());
    wait_for_job(&queue, &reference.job_id, JobState::DeadLetter).await;
    consumer.shutdown().await;

    assert_eq!(
        harness.store.status_of(document.id).await,
        DocumentStatus::Failed
    );
    assert!(harness.store.document(document.id).await.redacted_key.is_none());
}

#[tokio::test]
async fn test_shutdown_with_idle_pool_returns() {
    let harness = Harness::new();
    let queue = memory_queue(3);
    let consumer = JobConsumer::start(queue, harness.pipeline.clone(), fast_consumer_config());

    tokio::time::timeout(Duration::from_secs(5), consumer.shutdown())
        .await
        .expect("shutdown completes");
}
