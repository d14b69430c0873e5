//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] contracts::ContractError),

    /// No collector configured
    #[error("No upload endpoint: set [upload].base_url, --url or TELEMETRY_UPLOAD_URL")]
    NoEndpoint,

    /// Segment log error
    #[error("Log writer error: {0}")]
    Log(#[from] segment_log::LogError),

    /// Dispatcher error
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    /// Upload error
    #[error("Upload error: {0}")]
    Upload(#[from] uploader::UploadError),

    /// Background task failed
    #[error("Background task failed: {message}")]
    Task { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
