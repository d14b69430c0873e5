//! Segment - one physical log file holding ordered records

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Marker every segment filename contains
pub const SEGMENT_NAME_MARKER: &str = "_sensor_data_";
/// Legacy filename prefix (no user id)
pub const LEGACY_SEGMENT_PREFIX: &str = "sensor_data_";
/// Extension of plain segments
pub const PLAIN_EXTENSION: &str = ".jsonl";
/// Extension of gzip segments
pub const GZIP_EXTENSION: &str = ".jsonl.gz";
/// Prefix of point-in-time copies made for upload
pub const UPLOAD_COPY_PREFIX: &str = "upload_";

/// Storage mode of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// Directly appendable text
    Plain,
    /// One continuous gzip stream for the whole segment
    #[default]
    Gzip,
}

impl CompressionMode {
    /// Filename extension for this mode
    pub fn extension(self) -> &'static str {
        match self {
            Self::Plain => PLAIN_EXTENSION,
            Self::Gzip => GZIP_EXTENSION,
        }
    }

    /// Infer the mode of an existing segment from its name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(GZIP_EXTENSION) {
            Some(Self::Gzip)
        } else if name.ends_with(PLAIN_EXTENSION) {
            Some(Self::Plain)
        } else {
            None
        }
    }
}

/// Lifecycle state of a segment
///
/// `Writing -> Sealed -> Uploading -> Uploaded | FailedKeep`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    Writing,
    Sealed,
    Uploading,
    Uploaded,
    FailedKeep,
}

/// Whether a filename belongs to the segment namespace
pub fn is_segment_file_name(name: &str) -> bool {
    let has_extension = name.ends_with(PLAIN_EXTENSION) || name.ends_with(GZIP_EXTENSION);
    has_extension && (name.contains(SEGMENT_NAME_MARKER) || name.starts_with(LEGACY_SEGMENT_PREFIX))
}

/// Whether a filename is a temporary upload copy
pub fn is_upload_copy_name(name: &str) -> bool {
    name.starts_with(UPLOAD_COPY_PREFIX)
}

/// Descriptive view of one segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub path: PathBuf,
    pub mode: CompressionMode,
    pub state: SegmentState,
    /// Size tracked by the writer (active) or on disk (sealed)
    pub size_bytes: u64,
    /// Last modification, milliseconds since epoch
    pub modified_ms: i64,
}

/// Owner of sealed segments
///
/// The upload coordinator hands a segment back through this trait once the
/// server acknowledged it; the store forgets and deletes it.
pub trait SegmentStore: Send + Sync {
    /// Forget and delete a segment that has been uploaded
    fn release(&self, path: &Path) -> Result<(), ContractError>;
}

/// Store that just deletes the file
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOnRelease;

impl SegmentStore for DeleteOnRelease {
    fn release(&self, path: &Path) -> Result<(), ContractError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ContractError::segment_release(
                path.display().to_string(),
                e.to_string(),
            )),
        }
    }
}
