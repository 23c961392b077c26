//! Receipt-printer bridge for POS terminals
//!
//! Sits between a point-of-sale frontend and a thermal receipt printer:
//! accepts receipt payloads, persists them as print jobs, and drives a
//! single retrying queue worker that sends ESC/POS bytes over the
//! configured transport.

pub mod config;
pub mod executor;
pub mod logger;
pub mod notify;
pub mod receipt;
pub mod service;
pub mod store;
pub mod worker;

pub use config::Config;
pub use executor::{ConnectionStatus, PrintExecutor, ReceiptPrinter};
pub use notify::{JobOutcome, ResultNotifier, Waiter};
pub use receipt::{ReceiptPayload, format_receipt};
pub use service::PrintService;
pub use store::{Job, JobStatus, JobStore, StatusCounts};
pub use worker::QueueWorker;
