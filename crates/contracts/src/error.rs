//! Layered error definitions
//!
//! Categorized by source: config / consumer / storage

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Consumer Errors =====
    /// Consumer failed to accept a record
    #[error("consumer '{consumer}' write error: {message}")]
    ConsumerWrite { consumer: String, message: String },

    /// Record could not be serialized to its line form
    #[error("record serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    // ===== Storage Errors =====
    /// Segment store could not release a segment
    #[error("segment '{path}' release error: {message}")]
    SegmentRelease { path: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create consumer write error
    pub fn consumer_write(consumer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConsumerWrite {
            consumer: consumer.into(),
            message: message.into(),
        }
    }

    /// Create segment release error
    pub fn segment_release(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SegmentRelease {
            path: path.into(),
            message: message.into(),
        }
    }
}
