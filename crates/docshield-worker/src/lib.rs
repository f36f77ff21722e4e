//! Docshield redaction worker
//!
//! Everything between "a client asked for a redaction" and "the document is
//! `Completed` or `Failed`": the job wire format, queue transports, the
//! publisher and request precondition checks, the per-job pipeline and the
//! worker pool that drives it.

pub mod codec;
pub mod consumer;
pub mod deadline;
pub mod error;
pub mod pipeline;
pub mod publisher;
pub mod queue;
pub mod request;

pub use codec::{decode, encode};
pub use consumer::{ConsumerConfig, JobConsumer};
pub use deadline::JobDeadline;
pub use error::{CodecError, PipelineError, PublishError, RequestError};
pub use pipeline::{JobOutcome, PipelineConfig, RedactionPipeline};
pub use publisher::JobPublisher;
pub use queue::{DeadLetter, Delivery, JobQueue, JobReference, MemoryJobQueue, OutgoingJob, PgJobQueue};
#[cfg(feature = "queue-sqs")]
pub use queue::SqsJobQueue;
pub use request::RedactionRequestService;
