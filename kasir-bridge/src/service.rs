//! Print service facade
//!
//! Single entry point the boundary adapter talks to. Owns the shared
//! handles (store, notifier, executor) and the wake channel into the queue
//! worker; everything here is cheap to clone and safe to call from any
//! task.

use crate::executor::{ConnectionStatus, PrintExecutor};
use crate::notify::{ResultNotifier, Waiter};
use crate::receipt::ReceiptPayload;
use crate::store::{Job, JobStore, JobStoreResult, StatusCounts};
use crate::worker::QueueWorker;
use kasir_printer::{PrintResult, PrinterConfig};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone)]
pub struct PrintService {
    store: JobStore,
    notifier: ResultNotifier,
    executor: Arc<PrintExecutor>,
    wake_tx: mpsc::Sender<()>,
}

impl PrintService {
    /// Build the service and spawn its queue worker.
    ///
    /// The returned handle resolves once the worker has drained its current
    /// attempt after `shutdown` is cancelled.
    pub fn start(
        store: JobStore,
        config: PrinterConfig,
        max_attempts: u32,
        shutdown: CancellationToken,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        // Capacity 1: wakes coalesce, an already-signalled worker needs no more
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let notifier = ResultNotifier::new();
        let executor = Arc::new(PrintExecutor::new(config.clone()));

        let worker = QueueWorker::new(
            store.clone(),
            PrintExecutor::new(config),
            notifier.clone(),
            max_attempts,
        );
        let handle = tokio::spawn(worker.run(wake_rx, shutdown));

        info!("print service started");
        (
            Self {
                store,
                notifier,
                executor,
                wake_tx,
            },
            handle,
        )
    }

    /// Enqueue a receipt for printing.
    ///
    /// The job row is committed before the waiter is registered and before
    /// the worker is woken, so a crash between the steps leaves a durable
    /// pending job at worst.
    pub fn enqueue(&self, payload: ReceiptPayload, waiter: Option<Waiter>) -> JobStoreResult<Job> {
        let job = self.store.insert(payload)?;
        debug!(job_id = %job.id, seq = job.seq, "job enqueued");

        if let Some(waiter) = waiter {
            self.notifier.register(&job.id, waiter);
        }

        // Full channel means a wake is already pending
        let _ = self.wake_tx.try_send(());
        Ok(job)
    }

    /// Look up a single job
    pub fn job(&self, id: &str) -> JobStoreResult<Option<Job>> {
        self.store.get(id)
    }

    /// Queue totals per status
    pub fn status(&self) -> JobStoreResult<StatusCounts> {
        self.store.counts_by_status()
    }

    /// Probe the printer without touching the queue
    pub async fn check_connection(&self) -> ConnectionStatus {
        self.executor.check_connection().await
    }

    /// Kick the cash drawer immediately, bypassing the queue
    pub async fn open_drawer(&self) -> PrintResult<()> {
        self.executor.open_drawer().await
    }
}
