//! redb-based durable store for print jobs
//!
//! Jobs are the only durable artifact of the bridge. A job row carries the
//! full payload plus lifecycle state, so a process restart resumes exactly
//! where the previous run stopped: pending rows under the attempt cap are
//! picked up again by the worker's first pass.

use crate::receipt::ReceiptPayload;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Jobs table: key = job id, value = JSON row
const JOBS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

/// Single-row counter used to order jobs with identical timestamps
const SEQ_TABLE: TableDefinition<&str, u64> = TableDefinition::new("job_seq");

const SEQ_KEY: &str = "next";

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

pub type JobStoreResult<T> = Result<T, JobStoreError>;

/// Print job lifecycle state
///
/// `Done` and `Failed` are terminal; nothing ever transitions a failed job
/// back to pending automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

/// One durable unit of print work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub payload: ReceiptPayload,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Unix millis
    pub created_at: i64,
    pub updated_at: i64,
    /// Insertion order, breaks `created_at` ties for FIFO dispatch
    pub seq: u64,
}

/// Jobs per status, for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub done: u64,
    pub failed: u64,
}

/// Durable print job store
#[derive(Clone)]
pub struct JobStore {
    db: Arc<Database>,
}

impl JobStore {
    /// Open or create the database
    pub fn open(path: impl AsRef<Path>) -> JobStoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> JobStoreResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    /// Write a raw row directly, bypassing serialization (for tests that
    /// need an undecodable row)
    #[cfg(test)]
    pub(crate) fn put_raw(&self, id: &str, bytes: &[u8]) -> JobStoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(JOBS_TABLE)?;
            table.insert(id, bytes)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn init(db: Database) -> JobStoreResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(JOBS_TABLE)?;
            let _ = write_txn.open_table(SEQ_TABLE)?;
        }
        write_txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Insert a new job: status pending, zero attempts.
    ///
    /// The row is committed before this returns; an error here means the
    /// job was never queued.
    pub fn insert(&self, payload: ReceiptPayload) -> JobStoreResult<Job> {
        let txn = self.db.begin_write()?;
        let job = {
            let mut seq_table = txn.open_table(SEQ_TABLE)?;
            let seq = seq_table.get(SEQ_KEY)?.map(|v| v.value()).unwrap_or(0);
            seq_table.insert(SEQ_KEY, seq + 1)?;

            let now = chrono::Utc::now().timestamp_millis();
            let job = Job {
                id: uuid::Uuid::new_v4().to_string(),
                payload,
                status: JobStatus::Pending,
                attempts: 0,
                last_error: None,
                created_at: now,
                updated_at: now,
                seq,
            };

            let mut jobs_table = txn.open_table(JOBS_TABLE)?;
            let value = serde_json::to_vec(&job)?;
            jobs_table.insert(job.id.as_str(), value.as_slice())?;
            job
        };
        txn.commit()?;
        Ok(job)
    }

    /// Overwrite a job's lifecycle state, bumping `updated_at`.
    ///
    /// Idempotent: re-applying the same update leaves the same row (modulo
    /// the timestamp).
    pub fn update(
        &self,
        id: &str,
        status: JobStatus,
        attempts: u32,
        last_error: Option<String>,
    ) -> JobStoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(JOBS_TABLE)?;

            let bytes = {
                let value = table
                    .get(id)?
                    .ok_or_else(|| JobStoreError::JobNotFound(id.to_string()))?;
                value.value().to_vec()
            };

            let mut job: Job = serde_json::from_slice(&bytes)?;
            job.status = status;
            job.attempts = attempts;
            job.last_error = last_error;
            job.updated_at = chrono::Utc::now().timestamp_millis();

            let new_value = serde_json::to_vec(&job)?;
            table.insert(id, new_value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Get a job by id
    pub fn get(&self, id: &str) -> JobStoreResult<Option<Job>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        match table.get(id)? {
            Some(guard) => {
                let job: Job = serde_json::from_slice(guard.value())?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Fetch the pending job that should print next: earliest `created_at`,
    /// ties broken by insertion order.
    pub fn fetch_oldest_pending(&self) -> JobStoreResult<Option<Job>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        let mut oldest: Option<Job> = None;
        for result in table.iter()? {
            let (_, guard) = result?;
            let job: Job = serde_json::from_slice(guard.value())?;
            if job.status != JobStatus::Pending {
                continue;
            }
            let earlier = match &oldest {
                Some(current) => (job.created_at, job.seq) < (current.created_at, current.seq),
                None => true,
            };
            if earlier {
                oldest = Some(job);
            }
        }
        Ok(oldest)
    }

    /// Count jobs per status
    pub fn counts_by_status(&self) -> JobStoreResult<StatusCounts> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(JOBS_TABLE)?;

        let mut counts = StatusCounts::default();
        for result in table.iter()? {
            let (_, guard) = result?;
            let job: Job = serde_json::from_slice(guard.value())?;
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Done => counts.done += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}
