//! # Uploader
//!
//! Resumable, retrying, cancellable batch upload of sealed segments.
//!
//! Responsibilities:
//! - Upload an ordered batch of segments sequentially on one background task
//! - Resume each segment from the last acknowledged byte offset
//! - Retry transient faults with linear backoff, reset on truncation
//! - Report progress and exactly one terminal outcome per batch
//! - Probe collector reachability

mod coordinator;
mod endpoint;
mod error;
mod http;
mod outcome;
pub mod simulated;
mod transport;

pub use coordinator::{BatchHandle, UploadCoordinator};
pub use endpoint::{is_valid_server_info, Endpoint};
pub use error::{TransportError, UploadError};
pub use http::HttpTransport;
pub use outcome::{summarize_errors, AttemptOutcome, BatchObserver, BatchOutcome, NoopObserver};
pub use transport::{Delivered, LocalUploadTransport, ProgressFn, SegmentUpload, UploadTransport};
