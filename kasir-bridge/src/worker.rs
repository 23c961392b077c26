//! Print queue worker
//!
//! One dedicated task owns the queue: it is the only code that dequeues or
//! prints, so at most one print attempt is in flight process-wide. The
//! printer is a serial, stateful device; interleaved writes from concurrent
//! attempts would corrupt the paper output.
//!
//! Wakes arrive on a capacity-1 channel (enqueue uses `try_send`, so bursts
//! coalesce into one pending wake) and the channel itself guarantees a
//! single pass at a time. Between attempts the worker re-polls after a
//! fixed delay, so retries and jobs that arrived without a wake are still
//! serviced.

use crate::executor::ReceiptPrinter;
use crate::notify::ResultNotifier;
use crate::receipt::format_receipt;
use crate::store::{Job, JobStatus, JobStore};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default print attempt cap; a job failing this many times is terminal
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay between queue passes
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Single-worker print queue processor
pub struct QueueWorker<P: ReceiptPrinter> {
    store: JobStore,
    printer: P,
    notifier: ResultNotifier,
    max_attempts: u32,
}

impl<P: ReceiptPrinter> QueueWorker<P> {
    pub fn new(store: JobStore, printer: P, notifier: ResultNotifier, max_attempts: u32) -> Self {
        Self {
            store,
            printer,
            notifier,
            max_attempts,
        }
    }

    /// Run the worker until the wake channel closes or shutdown is
    /// signalled. The first pass fetches immediately, which is how pending
    /// jobs from a previous run get resumed.
    pub async fn run(self, mut wake_rx: mpsc::Receiver<()>, shutdown: CancellationToken) {
        info!(max_attempts = self.max_attempts, "print queue worker started");

        loop {
            let job = match self.store.fetch_oldest_pending() {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "failed to fetch pending job");
                    // Re-poll after a delay instead of parking on the wake
                    // channel: pending jobs may exist behind a transient
                    // store error, and no wake would arrive for them.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                    continue;
                }
            };

            match job {
                Some(job) => {
                    self.process(job).await;
                    // Fixed delay before the next pass; freshly enqueued jobs
                    // are picked up by the re-fetch regardless of wakes.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        wake = wake_rx.recv() => {
                            if wake.is_none() {
                                info!("wake channel closed, print queue worker stopping");
                                break;
                            }
                        }
                    }
                }
            }
        }

        info!("print queue worker stopped");
    }

    /// Run one print attempt and record its outcome.
    ///
    /// Errors are captured into the job row; nothing thrown here may kill
    /// the loop.
    async fn process(&self, job: Job) {
        let lines = format_receipt(&job.payload);

        match self.printer.print_receipt(&lines).await {
            Ok(()) => {
                info!(job_id = %job.id, attempts = job.attempts, "print succeeded");
                if let Err(e) = self.store.update(&job.id, JobStatus::Done, job.attempts, None) {
                    error!(job_id = %job.id, error = %e, "failed to record job success");
                }
                self.notifier.deliver(&job.id, JobStatus::Done, "printed");
            }
            Err(e) => {
                let attempts = job.attempts + 1;
                let message = e.to_string();
                let status = if attempts >= self.max_attempts {
                    JobStatus::Failed
                } else {
                    JobStatus::Pending
                };

                warn!(
                    job_id = %job.id,
                    attempts,
                    terminal = status == JobStatus::Failed,
                    error = %message,
                    "print attempt failed"
                );

                if let Err(e) =
                    self.store
                        .update(&job.id, status, attempts, Some(message.clone()))
                {
                    error!(job_id = %job.id, error = %e, "failed to record job failure");
                }
                self.notifier.deliver(&job.id, JobStatus::Failed, &message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Waiter;
    use crate::receipt::{ReceiptHeader, ReceiptPayload};
    use kasir_printer::{PrintError, PrintResult};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::Mutex;

    fn payload(title: &str) -> ReceiptPayload {
        ReceiptPayload {
            header: ReceiptHeader {
                title: Some(title.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Printer that fails the first `failures` attempts, then succeeds,
    /// recording the title line of everything it prints.
    struct FlakyPrinter {
        failures: u32,
        calls: Arc<AtomicU32>,
        printed: Arc<Mutex<Vec<String>>>,
        in_flight: Arc<AtomicBool>,
    }

    impl FlakyPrinter {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: Arc::new(AtomicU32::new(0)),
                printed: Arc::new(Mutex::new(Vec::new())),
                in_flight: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl ReceiptPrinter for FlakyPrinter {
        async fn print_receipt(&self, lines: &[String]) -> PrintResult<()> {
            // At most one attempt may ever be in flight
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "overlapping print attempts"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;

            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let result = if call <= self.failures {
                Err(PrintError::Transport(format!("simulated failure {call}")))
            } else {
                self.printed.lock().await.push(lines[0].clone());
                Ok(())
            };

            self.in_flight.store(false, Ordering::SeqCst);
            result
        }
    }

    async fn wait_for_terminal(store: &JobStore, id: &str) -> Job {
        for _ in 0..100 {
            let job = store.get(id).unwrap().unwrap();
            if job.status != JobStatus::Pending {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {id} never reached a terminal status");
    }

    fn spawn_worker(
        store: JobStore,
        printer: FlakyPrinter,
        notifier: ResultNotifier,
    ) -> (mpsc::Sender<()>, CancellationToken, tokio::task::JoinHandle<()>) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();
        let worker = QueueWorker::new(store, printer, notifier, DEFAULT_MAX_ATTEMPTS);
        let handle = tokio::spawn(worker.run(wake_rx, shutdown.clone()));
        (wake_tx, shutdown, handle)
    }

    #[tokio::test]
    async fn test_success_marks_done_and_notifies() {
        let store = JobStore::open_in_memory().unwrap();
        let notifier = ResultNotifier::new();
        let job = store.insert(payload("OK")).unwrap();

        let (waiter, rx) = Waiter::new("req-1");
        notifier.register(&job.id, waiter);

        let (wake_tx, shutdown, handle) =
            spawn_worker(store.clone(), FlakyPrinter::new(0), notifier);
        wake_tx.try_send(()).unwrap();

        let done = wait_for_terminal(&store, &job.id).await;
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.attempts, 0);
        assert!(done.last_error.is_none());

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.status, JobStatus::Done);
        assert_eq!(outcome.request_id, "req-1");

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_three_failures_exhaust_retries() {
        let store = JobStore::open_in_memory().unwrap();
        let notifier = ResultNotifier::new();
        let job = store.insert(payload("DOOMED")).unwrap();

        // Fails more times than the cap allows, so the job dies
        let (wake_tx, shutdown, handle) =
            spawn_worker(store.clone(), FlakyPrinter::new(10), notifier);
        wake_tx.try_send(()).unwrap();

        let dead = wait_for_terminal(&store, &job.id).await;
        assert_eq!(dead.status, JobStatus::Failed);
        assert_eq!(dead.attempts, 3);
        // last_error is the third attempt's error, as rendered by PrintError
        assert_eq!(
            dead.last_error.as_deref(),
            Some("Transport error: simulated failure 3")
        );

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let store = JobStore::open_in_memory().unwrap();
        let notifier = ResultNotifier::new();
        let job = store.insert(payload("RECOVERS")).unwrap();

        let (wake_tx, shutdown, handle) =
            spawn_worker(store.clone(), FlakyPrinter::new(2), notifier);
        wake_tx.try_send(()).unwrap();

        let done = wait_for_terminal(&store, &job.id).await;
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.attempts, 2);
        // Success clears the recorded error
        assert!(done.last_error.is_none());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fifo_across_jobs() {
        let store = JobStore::open_in_memory().unwrap();
        let notifier = ResultNotifier::new();

        let first = store.insert(payload("FIRST")).unwrap();
        let second = store.insert(payload("SECOND")).unwrap();

        let printer = FlakyPrinter::new(0);
        let printed = printer.printed.clone();

        let (wake_tx, shutdown, handle) = spawn_worker(store.clone(), printer, notifier);
        wake_tx.try_send(()).unwrap();

        wait_for_terminal(&store, &first.id).await;
        wait_for_terminal(&store, &second.id).await;

        let order = printed.lock().await.clone();
        assert_eq!(order, vec!["FIRST".to_string(), "SECOND".to_string()]);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_error_does_not_park_worker() {
        let store = JobStore::open_in_memory().unwrap();
        let notifier = ResultNotifier::new();

        // An undecodable row makes every fetch fail
        store.put_raw("garbled", b"not json").unwrap();
        let job = store.insert(payload("HEALED")).unwrap();

        // No wake is ever sent; the worker must keep re-polling on its own
        let (_wake_tx, shutdown, handle) =
            spawn_worker(store.clone(), FlakyPrinter::new(0), notifier);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(
            store.get(&job.id).unwrap().unwrap().status,
            JobStatus::Pending
        );

        // Repair the row; the next poll must pick the pending job up
        let repaired = Job {
            id: "garbled".to_string(),
            payload: ReceiptPayload::default(),
            status: JobStatus::Done,
            attempts: 0,
            last_error: None,
            created_at: 0,
            updated_at: 0,
            seq: 0,
        };
        store
            .put_raw("garbled", &serde_json::to_vec(&repaired).unwrap())
            .unwrap();

        let done = wait_for_terminal(&store, &job.id).await;
        assert_eq!(done.status, JobStatus::Done);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_survives_job_failure() {
        let store = JobStore::open_in_memory().unwrap();
        let notifier = ResultNotifier::new();

        let doomed = store.insert(payload("DOOMED")).unwrap();

        // First three attempts fail (killing the first job), then succeed
        let (wake_tx, shutdown, handle) =
            spawn_worker(store.clone(), FlakyPrinter::new(3), notifier);
        wake_tx.try_send(()).unwrap();

        let dead = wait_for_terminal(&store, &doomed.id).await;
        assert_eq!(dead.status, JobStatus::Failed);

        // The loop is still alive and serves the next job
        let next = store.insert(payload("ALIVE")).unwrap();
        let _ = wake_tx.try_send(());
        let done = wait_for_terminal(&store, &next.id).await;
        assert_eq!(done.status, JobStatus::Done);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
