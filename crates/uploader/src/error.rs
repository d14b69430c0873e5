//! Uploader error types

use thiserror::Error;

/// Errors returned synchronously by the coordinator
#[derive(Debug, Error)]
pub enum UploadError {
    /// Another batch is still running; nothing was queued
    #[error("an upload batch is already in flight")]
    BatchInFlight,

    /// Batch with no segments
    #[error("upload batch is empty")]
    EmptyBatch,

    /// Server address rejected by validation
    #[error("invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },

    /// Batches run on tokio tasks
    #[error("upload requires a tokio runtime")]
    NoRuntime,

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Coordination task ended abnormally
    #[error("upload task failed: {0}")]
    TaskFailed(String),
}

impl UploadError {
    pub fn invalid_endpoint(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Failure of one transfer attempt
///
/// Variants that can happen mid-body carry `delivered`, the number of body
/// bytes the server confirmed it stored before the failure. Bytes only
/// written to the connection do not count.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {message}")]
    Connect { message: String, delivered: u64 },

    #[error("request timed out")]
    Timeout { delivered: u64 },

    #[error("I/O error: {message}")]
    Io { message: String, delivered: u64 },

    /// Stream ended before the message completed
    #[error("unexpected end of stream")]
    Truncated,

    /// Non-2xx response
    #[error("server rejected upload: HTTP {status}")]
    Rejected { status: u16, body: String },

    /// Not worth retrying
    #[error("{0}")]
    Fatal(String),
}

impl TransportError {
    /// Body bytes the server confirmed before the failure
    pub fn delivered(&self) -> u64 {
        match self {
            Self::Connect { delivered, .. }
            | Self::Timeout { delivered }
            | Self::Io { delivered, .. } => *delivered,
            _ => 0,
        }
    }

    pub fn io(message: impl Into<String>, delivered: u64) -> Self {
        Self::Io {
            message: message.into(),
            delivered,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}
