//! PipelineConfig - config_loader output
//!
//! Tunable policy for the three components. Thresholds are policy, not
//! protocol; every field has a default so a minimal file only names the
//! storage directory.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CompressionMode, DEFAULT_USER_ID};

/// Default rotation size threshold (1 GiB)
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 1024 * 1024 * 1024;
/// Default rotation timer interval (1 hour)
pub const DEFAULT_ROTATION_INTERVAL_SECS: u64 = 60 * 60;
/// Default dispatcher queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;
/// Default maximum number of retries per segment
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base retry delay
pub const DEFAULT_RETRY_DELAY_MS: u64 = 3000;
/// Default bound on the batch error summary
pub const DEFAULT_SUMMARY_LIMIT: usize = 500;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Durable log settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Upload settings
    #[serde(default)]
    pub upload: UploadSettings,

    /// Identity attached to records and segment names
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Durable log writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding segment files
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,

    /// Compression mode for new segments
    #[serde(default)]
    pub compression: CompressionMode,

    /// Rotate once the active segment reaches this many bytes
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: u64,

    /// Periodic rotation interval while recording (seconds)
    #[serde(default = "default_rotation_interval_secs")]
    pub rotation_interval_secs: u64,

    /// Minimum gap between snapshot-forced rotations of gzip segments (seconds, 0 = none)
    #[serde(default)]
    pub min_forced_rotation_interval_secs: u64,
}

impl StorageConfig {
    /// Rotation timer interval
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    /// Minimum gap between forced rotations
    pub fn min_forced_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.min_forced_rotation_interval_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            compression: CompressionMode::default(),
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            rotation_interval_secs: DEFAULT_ROTATION_INTERVAL_SECS,
            min_forced_rotation_interval_secs: 0,
        }
    }
}

/// What the dispatcher does when its worker queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Run the delivery on the producer thread (never drops)
    #[default]
    ExecuteInline,
    /// Block the producer until the queue has room
    BlockCaller,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Bounded worker queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Overflow policy
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Upload coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Collector base URL (e.g. `http://10.0.0.2:8080`)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Retries per segment after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay, multiplied by the attempt number
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// TCP connect timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Statuses meaning the server kept partial data; the resume offset survives them
    #[serde(default = "default_partial_receipt_statuses")]
    pub partial_receipt_statuses: Vec<u16>,

    /// Maximum length of the batch error summary
    #[serde(default = "default_summary_limit")]
    pub summary_limit: usize,
}

impl UploadSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            partial_receipt_statuses: default_partial_receipt_statuses(),
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./segments")
}

fn default_max_segment_bytes() -> u64 {
    DEFAULT_MAX_SEGMENT_BYTES
}

fn default_rotation_interval_secs() -> u64 {
    DEFAULT_ROTATION_INTERVAL_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_partial_receipt_statuses() -> Vec<u16> {
    vec![404, 500]
}

fn default_summary_limit() -> usize {
    DEFAULT_SUMMARY_LIMIT
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}
