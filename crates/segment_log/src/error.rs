//! Log writer error types

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Errors raised by the durable log writer
#[derive(Debug, Error)]
pub enum LogError {
    /// File system operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Write still failing after the reopen-and-retry
    #[error("write to {} failed after retry: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be serialized
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Writer has been shut down
    #[error("log writer is shut down")]
    Closed,

    /// Rotation timer needs to be started from inside a tokio runtime
    #[error("rotation timer requires a tokio runtime")]
    NoRuntime,
}

impl LogError {
    /// Create an I/O error bound to a path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<LogError> for ContractError {
    fn from(e: LogError) -> Self {
        ContractError::consumer_write("segment_log", e.to_string())
    }
}
