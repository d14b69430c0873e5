//! SegmentUploader - drains the log writer's pending segments through the coordinator

use std::path::PathBuf;
use std::sync::Arc;

use contracts::{is_upload_copy_name, UploadSettings};
use observability::UploadStatsAggregator;
use segment_log::LogWriter;
use tracing::{debug, info, warn};
use uploader::{
    BatchHandle, BatchObserver, BatchOutcome, Endpoint, HttpTransport, UploadCoordinator,
    UploadError,
};

use crate::error::{CliError, Result};

/// Logs batch progress and the terminal outcome
struct LoggingObserver;

impl BatchObserver for LoggingObserver {
    fn on_progress(&self, percent: u8) {
        debug!(percent, "Upload progress");
    }

    fn on_success(&self, outcome: &BatchOutcome) {
        info!(segments = outcome.success_count, "Upload batch succeeded");
    }

    fn on_failure(&self, outcome: &BatchOutcome) {
        warn!(
            success = outcome.success_count,
            failed = outcome.fail_count,
            cancelled = outcome.cancelled,
            summary = %outcome.error_summary,
            "Upload batch failed"
        );
    }
}

/// A batch started by [`SegmentUploader::start_pending`]
pub struct PendingBatch {
    handle: BatchHandle,
    segments: Vec<PathBuf>,
}

impl PendingBatch {
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Wait for the terminal outcome; cancel-safe, not to be polled after it returned
    pub async fn wait(&mut self) -> std::result::Result<BatchOutcome, UploadError> {
        self.handle.wait().await
    }
}

/// Uploads what the writer reports as pending to one collector
pub struct SegmentUploader {
    coordinator: UploadCoordinator<HttpTransport>,
    endpoint: Endpoint,
    writer: Arc<LogWriter>,
}

impl SegmentUploader {
    pub fn new(settings: &UploadSettings, endpoint: Endpoint, writer: Arc<LogWriter>) -> Result<Self> {
        let transport = HttpTransport::new(settings)?;
        let coordinator = UploadCoordinator::new(transport, settings.clone(), writer.clone());
        Ok(Self {
            coordinator,
            endpoint,
            writer,
        })
    }

    pub fn coordinator(&self) -> &UploadCoordinator<HttpTransport> {
        &self.coordinator
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Snapshot pending segments and upload them as one batch.
    ///
    /// Returns `None` when there was nothing to send or a batch was already running.
    pub async fn upload_pending(
        &self,
        stats: &mut UploadStatsAggregator,
    ) -> Result<Option<BatchOutcome>> {
        let Some(mut batch) = self.start_pending(stats).await? else {
            return Ok(None);
        };
        let outcome = batch.wait().await;
        self.finish(batch, outcome, stats).map(Some)
    }

    /// Snapshot pending segments and start uploading them without waiting.
    ///
    /// Returns `None` when there was nothing to send or a batch was already running.
    pub async fn start_pending(
        &self,
        stats: &mut UploadStatsAggregator,
    ) -> Result<Option<PendingBatch>> {
        let writer = self.writer.clone();
        let pending = tokio::task::spawn_blocking(move || writer.pending_segments())
            .await
            .map_err(|e| CliError::task(e.to_string()))??;

        if pending.is_empty() {
            debug!("No pending segments");
            return Ok(None);
        }
        for path in &pending {
            if let Ok(meta) = std::fs::metadata(path) {
                stats.push_segment(meta.len());
            }
        }

        info!(segments = pending.len(), endpoint = %self.endpoint, "Uploading pending segments");
        match self.coordinator.upload_batch(
            pending.clone(),
            self.endpoint.clone(),
            Arc::new(LoggingObserver),
        ) {
            Ok(handle) => Ok(Some(PendingBatch {
                handle,
                segments: pending,
            })),
            Err(UploadError::BatchInFlight) => {
                debug!("Previous upload batch still running");
                self.discard_snapshot_copies(&pending);
                Ok(None)
            }
            Err(e) => {
                self.discard_snapshot_copies(&pending);
                Err(e.into())
            }
        }
    }

    /// Record the outcome of a started batch and drop its leftover snapshot copies
    pub fn finish(
        &self,
        batch: PendingBatch,
        outcome: std::result::Result<BatchOutcome, UploadError>,
        stats: &mut UploadStatsAggregator,
    ) -> Result<BatchOutcome> {
        self.discard_snapshot_copies(&batch.segments);
        let outcome = outcome?;
        stats.update_batch(
            outcome.success_count as u64,
            outcome.fail_count as u64,
            outcome.cancelled,
        );
        Ok(outcome)
    }

    /// Snapshot copies that were not uploaded are stale; the original still holds the data
    fn discard_snapshot_copies(&self, paths: &[PathBuf]) {
        for path in paths {
            let is_copy = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_upload_copy_name);
            if !is_copy {
                continue;
            }
            self.coordinator.clear_upload_progress(path);
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(segment = %path.display(), error = %e, "Cannot remove snapshot copy");
                }
            }
        }
    }
}
