//! Per-job deadline and cancellation
//!
//! Every suspend point of the pipeline goes through [`JobDeadline::run`] so a
//! job stops before the transport's hard limit, leaving the cleanup slack for
//! the best-effort `Failed` update.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct JobDeadline {
    deadline: Instant,
    token: CancellationToken,
}

impl JobDeadline {
    pub fn new(budget: Duration) -> Self {
        Self::with_token(budget, CancellationToken::new())
    }

    /// Deadline that also fires when `token` is cancelled (e.g. worker shutdown).
    pub fn with_token(budget: Duration, token: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + budget,
            token,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fail if the deadline has passed before `step` starts.
    pub fn check(&self, step: &'static str) -> Result<(), PipelineError> {
        if self.is_expired() {
            return Err(PipelineError::DeadlineExceeded { step });
        }
        Ok(())
    }

    /// Run `future` for `step`, abandoning it when the deadline fires first.
    pub async fn run<F, T>(&self, step: &'static str, future: F) -> Result<T, PipelineError>
    where
        F: Future<Output = T>,
    {
        self.check(step)?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PipelineError::DeadlineExceeded { step }),
            _ = tokio::time::sleep_until(self.deadline) => Err(PipelineError::DeadlineExceeded { step }),
            output = future => Ok(output),
        }
    }
}
