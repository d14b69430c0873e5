//! # Segment Log
//!
//! Durable, rotating, crash-recoverable append log.
//!
//! Responsibilities:
//! - Persist each record as one JSON line while the recording flag is set
//! - Rotate segments by size, by timer and on demand
//! - Recover existing segments on startup (plain: resume appends, gzip: seal)
//! - Produce point-in-time snapshots of unsent data for the uploader
//! - Retention: mark uploaded, keep recent, clean all

mod error;
mod naming;
mod recovery;
mod segment;
mod timer;
mod writer;

pub use error::LogError;
pub use naming::{segment_file_name, upload_copy_name, DEFAULT_SEGMENT_USER};
pub use writer::{LogWriter, RotationReason};
