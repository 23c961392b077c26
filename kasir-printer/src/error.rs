//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Missing or invalid printer configuration (bad driver tag, unparsable
    /// USB ids, missing address). Recurs identically until the operator
    /// fixes the configuration.
    #[error("Invalid config: {0}")]
    Config(String),

    /// Device-level failure: connection refused, device absent or busy,
    /// access denied, binding not established.
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error while talking to an open device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
