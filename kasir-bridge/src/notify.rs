//! Best-effort result delivery back to waiting callers
//!
//! A waiter is registered at enqueue time when the caller wants the attempt
//! outcome, keyed by job id, and consumed exactly once on delivery. Jobs
//! without a waiter (or whose caller went away) are processed exactly the
//! same; delivery never blocks the queue.

use crate::store::JobStatus;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Terminal outcome of a print attempt, as seen by the caller
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    /// Caller-supplied correlation id
    pub request_id: String,
    pub status: JobStatus,
    pub message: String,
}

/// One registered caller waiting for a job outcome
pub struct Waiter {
    pub request_id: String,
    pub tx: oneshot::Sender<JobOutcome>,
}

impl Waiter {
    /// Create a waiter and the receiving half the caller holds on to
    pub fn new(request_id: impl Into<String>) -> (Self, oneshot::Receiver<JobOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request_id: request_id.into(),
                tx,
            },
            rx,
        )
    }
}

/// Ephemeral job-id → waiter mapping
#[derive(Clone, Default)]
pub struct ResultNotifier {
    waiters: Arc<DashMap<String, Waiter>>,
}

impl ResultNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for a job. Only called after the job row is
    /// durably inserted.
    pub fn register(&self, job_id: &str, waiter: Waiter) {
        self.waiters.insert(job_id.to_string(), waiter);
    }

    /// Deliver an attempt outcome to the job's waiter, if one is still
    /// registered. The waiter is removed either way a send goes; a dropped
    /// receiver is not an error.
    pub fn deliver(&self, job_id: &str, status: JobStatus, message: &str) {
        let Some((_, waiter)) = self.waiters.remove(job_id) else {
            return;
        };

        let outcome = JobOutcome {
            job_id: job_id.to_string(),
            request_id: waiter.request_id,
            status,
            message: message.to_string(),
        };
        if waiter.tx.send(outcome).is_err() {
            debug!(job_id, "waiter gone before delivery");
        }
    }

    /// Number of registered waiters (observability)
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

impl std::fmt::Debug for ResultNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultNotifier")
            .field("waiting", &self.waiters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_consumes_waiter() {
        let notifier = ResultNotifier::new();
        let (waiter, mut rx) = Waiter::new("req-1");

        notifier.register("job-1", waiter);
        assert_eq!(notifier.waiting(), 1);

        notifier.deliver("job-1", JobStatus::Done, "printed");
        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.request_id, "req-1");
        assert_eq!(outcome.status, JobStatus::Done);
        assert_eq!(notifier.waiting(), 0);

        // Second delivery for the same id is a no-op
        notifier.deliver("job-1", JobStatus::Failed, "again");
    }

    #[tokio::test]
    async fn test_deliver_without_waiter_is_noop() {
        let notifier = ResultNotifier::new();
        notifier.deliver("unknown", JobStatus::Failed, "nobody listening");
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_error() {
        let notifier = ResultNotifier::new();
        let (waiter, rx) = Waiter::new("req-2");
        notifier.register("job-2", waiter);
        drop(rx);

        notifier.deliver("job-2", JobStatus::Done, "printed");
        assert_eq!(notifier.waiting(), 0);
    }
}
