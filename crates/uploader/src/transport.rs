//! UploadTransport trait - one segment transfer attempt

use std::path::PathBuf;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::TransportError;

/// Called with the number of body bytes handed over so far in this attempt
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// One attempt to send the tail of a segment starting at `offset`
#[derive(Debug, Clone)]
pub struct SegmentUpload {
    pub path: PathBuf,
    pub file_name: String,
    /// Bytes the server already holds
    pub offset: u64,
    /// Full segment size
    pub size: u64,
}

impl SegmentUpload {
    /// Bytes this attempt has to send
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.offset)
    }
}

/// Server acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    /// Opaque confirmation body
    pub confirmation: String,
}

/// Transfer backend used by the coordinator
#[trait_variant::make(UploadTransport: Send)]
pub trait LocalUploadTransport {
    /// Transfer name (used for logging)
    fn name(&self) -> &str;

    /// Send `upload.remaining()` bytes of the segment
    ///
    /// # Errors
    /// Transient failures report how many bytes the server confirmed, never
    /// bytes merely written to the connection
    async fn send(
        &self,
        endpoint: &Endpoint,
        upload: &SegmentUpload,
        progress: ProgressFn,
    ) -> Result<Delivered, TransportError>;

    /// Reachability probe
    async fn ping(&self, endpoint: &Endpoint) -> Result<String, TransportError>;
}
