//! UploadCoordinator - one resumable batch at a time

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use contracts::{PressureAware, PressureLevel, SegmentStore, UploadSettings};
use observability::UploadOutcomeLabel;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::endpoint::Endpoint;
use crate::error::{TransportError, UploadError};
use crate::outcome::{summarize_errors, AttemptOutcome, BatchObserver, BatchOutcome};
use crate::transport::{ProgressFn, SegmentUpload, UploadTransport};

enum BatchEvent {
    Progress(u8),
    Finished(BatchOutcome),
}

enum SegmentResult {
    Uploaded,
    Failed(String),
    Cancelled,
}

struct Shared<T> {
    transport: T,
    settings: UploadSettings,
    store: Arc<dyn SegmentStore>,
    /// segment path -> bytes the server already holds
    progress: Mutex<HashMap<PathBuf, u64>>,
    in_flight: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

impl<T> Shared<T> {
    fn offset(&self, path: &Path) -> u64 {
        lock(&self.progress).get(path).copied().unwrap_or(0)
    }

    fn set_offset(&self, path: &Path, offset: u64) {
        lock(&self.progress).insert(path.to_path_buf(), offset);
    }

    fn clear_offset(&self, path: &Path) {
        lock(&self.progress).remove(path);
    }
}

/// Releases the in-flight slot when the batch task ends, however it ends
struct FlightGuard<T>(Arc<Shared<T>>);

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        lock(&self.0.current).take();
        self.0.in_flight.store(false, Ordering::Release);
    }
}

/// Handle to a running batch
pub struct BatchHandle {
    task: JoinHandle<BatchOutcome>,
    token: CancellationToken,
}

impl BatchHandle {
    /// Cancel this batch
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome (delivered to the observer first)
    pub async fn join(mut self) -> Result<BatchOutcome, UploadError> {
        self.wait().await
    }

    /// Cancel-safe form of [`BatchHandle::join`] for use inside `select!`.
    ///
    /// Must not be polled again once it has returned.
    pub async fn wait(&mut self) -> Result<BatchOutcome, UploadError> {
        (&mut self.task)
            .await
            .map_err(|e| UploadError::TaskFailed(e.to_string()))
    }
}

/// Uploads ordered batches of segments, at most one batch at a time.
///
/// Each segment resumes from the offset the server last acknowledged. The
/// observer gets progress updates and exactly one terminal callback, always
/// from a coordination task separate from the network task.
pub struct UploadCoordinator<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for UploadCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> UploadCoordinator<T>
where
    T: UploadTransport + Sync + 'static,
{
    /// Create a coordinator. `store` is told about every acknowledged segment.
    pub fn new(transport: T, settings: UploadSettings, store: Arc<dyn SegmentStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                settings,
                store,
                progress: Mutex::new(HashMap::new()),
                in_flight: AtomicBool::new(false),
                current: Mutex::new(None),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    /// Start uploading `segments` in order.
    ///
    /// Fails immediately, without side effects, if a batch is already running.
    #[instrument(
        name = "upload_coordinator_upload_batch",
        skip_all,
        fields(segments = segments.len(), endpoint = %endpoint)
    )]
    pub fn upload_batch(
        &self,
        segments: Vec<PathBuf>,
        endpoint: Endpoint,
        observer: Arc<dyn BatchObserver>,
    ) -> Result<BatchHandle, UploadError> {
        let runtime = Handle::try_current().map_err(|_| UploadError::NoRuntime)?;

        if self
            .shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Upload batch rejected, another one is running");
            return Err(UploadError::BatchInFlight);
        }
        let flight = FlightGuard(self.shared.clone());

        if segments.is_empty() {
            return Err(UploadError::EmptyBatch);
        }

        let token = CancellationToken::new();
        *lock(&self.shared.current) = Some(token.clone());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_batch(
            self.shared.clone(),
            segments,
            endpoint,
            token.clone(),
            events_tx,
            flight,
        ));
        let task = runtime.spawn(coordinate(events_rx, observer, token.clone()));

        Ok(BatchHandle { task, token })
    }

    /// Connectivity probe (`GET {base}/ping`)
    pub async fn ping(&self, endpoint: &Endpoint) -> Result<String, TransportError> {
        self.shared.transport.ping(endpoint).await
    }

    /// Bytes of `path` the server is known to hold
    pub fn uploaded_bytes(&self, path: &Path) -> u64 {
        self.shared.offset(path)
    }

    pub fn clear_upload_progress(&self, path: &Path) {
        self.shared.clear_offset(path);
    }

    pub fn clear_all_upload_progress(&self) {
        lock(&self.shared.progress).clear();
    }

    pub fn is_uploading(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Cancel the running batch, if any
    pub fn cancel_all(&self) {
        if let Some(token) = lock(&self.shared.current).as_ref() {
            info!("Cancelling upload batch");
            token.cancel();
        }
    }
}

impl<T> PressureAware for UploadCoordinator<T>
where
    T: UploadTransport + Sync + 'static,
{
    fn on_resource_pressure(&self, level: PressureLevel) {
        match level {
            PressureLevel::Critical | PressureLevel::Complete => {
                warn!(?level, "Resource pressure, cancelling uploads");
                self.cancel_all();
                self.clear_all_upload_progress();
            }
            PressureLevel::Moderate => {
                info!(?level, "Resource pressure noted, uploads continue");
            }
            PressureLevel::Low => debug!(?level, "Resource pressure noted"),
        }
    }
}

/// Forward events to the observer; deliver the single terminal callback
async fn coordinate(
    mut events: UnboundedReceiver<BatchEvent>,
    observer: Arc<dyn BatchObserver>,
    token: CancellationToken,
) -> BatchOutcome {
    let mut finished = None;
    while let Some(event) = events.recv().await {
        match event {
            BatchEvent::Progress(percent) => {
                observability::record_upload_progress(percent);
                observer.on_progress(percent);
            }
            BatchEvent::Finished(outcome) => {
                finished = Some(outcome);
                break;
            }
        }
    }

    let mut outcome = finished.unwrap_or_else(|| BatchOutcome {
        error_summary: "upload task ended unexpectedly".to_string(),
        fail_count: 1,
        ..BatchOutcome::default()
    });
    if token.is_cancelled() {
        outcome.cancelled = true;
    }

    if outcome.is_success() {
        observability::record_upload_progress(100);
        observer.on_progress(100);
        observer.on_success(&outcome);
    } else {
        observer.on_failure(&outcome);
    }
    outcome
}

async fn run_batch<T>(
    shared: Arc<Shared<T>>,
    segments: Vec<PathBuf>,
    endpoint: Endpoint,
    token: CancellationToken,
    events: UnboundedSender<BatchEvent>,
    flight: FlightGuard<T>,
) where
    T: UploadTransport + Sync + 'static,
{
    let total = segments.len();
    let mut outcome = BatchOutcome::default();
    let mut errors = Vec::new();
    info!(segments = total, endpoint = %endpoint, transport = shared.transport.name(), "Upload batch started");

    for (index, path) in segments.iter().enumerate() {
        if token.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        let name = file_name(path);
        let reporter = ProgressReporter::new(events.clone(), index, total);

        let size = match validate_segment(path).await {
            Ok(size) => size,
            Err(reason) => {
                warn!(segment = %path.display(), reason, "Skipping invalid segment");
                outcome.fail_count += 1;
                errors.push(format!("{name}: {reason}"));
                observability::record_upload(UploadOutcomeLabel::Failure, 0);
                reporter.segment_done();
                continue;
            }
        };

        match upload_segment(&shared, &endpoint, path, &name, size, &token, &reporter).await {
            SegmentResult::Uploaded => {
                outcome.success_count += 1;
                observability::record_upload(UploadOutcomeLabel::Success, size);
                if let Err(e) = shared.store.release(path) {
                    warn!(segment = %path.display(), error = %e, "Uploaded segment not released");
                }
            }
            SegmentResult::Failed(reason) => {
                outcome.fail_count += 1;
                observability::record_upload(UploadOutcomeLabel::Failure, 0);
                errors.push(format!("{name}: {reason}"));
            }
            SegmentResult::Cancelled => {
                outcome.fail_count += 1;
                outcome.cancelled = true;
                observability::record_upload(UploadOutcomeLabel::Cancelled, 0);
                errors.push(format!("{name}: cancelled"));
                break;
            }
        }
        reporter.segment_done();
    }

    outcome.error_summary = summarize_errors(&errors, shared.settings.summary_limit);
    info!(
        success = outcome.success_count,
        failed = outcome.fail_count,
        cancelled = outcome.cancelled,
        "Upload batch finished"
    );

    // Free the slot before the observer hears about it
    drop(flight);
    let _ = events.send(BatchEvent::Finished(outcome));
}

/// Attempt loop for one segment
async fn upload_segment<T>(
    shared: &Shared<T>,
    endpoint: &Endpoint,
    path: &Path,
    name: &str,
    size: u64,
    token: &CancellationToken,
    reporter: &ProgressReporter,
) -> SegmentResult
where
    T: UploadTransport + Sync + 'static,
{
    let settings = &shared.settings;
    let mut retries: u32 = 0;

    loop {
        let offset = shared.offset(path).min(size);
        let upload = SegmentUpload {
            path: path.to_path_buf(),
            file_name: name.to_string(),
            offset,
            size,
        };
        debug!(segment = name, attempt = retries + 1, offset, "Upload attempt");

        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => AttemptOutcome::Cancelled,
            result = shared.transport.send(endpoint, &upload, reporter.for_attempt(offset, size)) => {
                AttemptOutcome::classify(result)
            }
        };

        let last_error = match attempt {
            AttemptOutcome::Success { confirmation } => {
                shared.clear_offset(path);
                info!(segment = name, bytes = size, confirmation = %confirmation, "Segment uploaded");
                return SegmentResult::Uploaded;
            }
            AttemptOutcome::Cancelled => {
                info!(segment = name, offset, "Upload cancelled");
                return SegmentResult::Cancelled;
            }
            AttemptOutcome::Fatal { reason } => {
                error!(segment = name, reason, "Upload failed, not retrying");
                return SegmentResult::Failed(reason);
            }
            AttemptOutcome::Retryable { delivered, reason } => {
                let resume_at = (offset + delivered).min(size);
                shared.set_offset(path, resume_at);
                warn!(segment = name, attempt = retries + 1, resume_at, reason, "Upload attempt failed");
                reason
            }
            AttemptOutcome::Truncated => {
                shared.set_offset(path, 0);
                warn!(segment = name, attempt = retries + 1, "Stream truncated, restarting segment");
                "unexpected end of stream".to_string()
            }
            AttemptOutcome::Rejected { status } => {
                if !settings.partial_receipt_statuses.contains(&status) {
                    shared.clear_offset(path);
                }
                warn!(segment = name, attempt = retries + 1, status, "Server rejected upload");
                format!("HTTP {status}")
            }
        };

        if retries >= settings.max_retries {
            return SegmentResult::Failed(format!("{last_error} after {} attempts", retries + 1));
        }
        retries += 1;
        observability::record_upload_retry(retries);

        let delay = settings.retry_delay() * retries;
        tokio::select! {
            biased;
            _ = token.cancelled() => return SegmentResult::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn validate_segment(path: &Path) -> Result<u64, &'static str> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if !meta.is_file() => Err("not a file"),
        Ok(meta) if meta.len() == 0 => Err("empty file"),
        Ok(meta) => Ok(meta.len()),
        Err(_) => Err("file not found"),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Turns per-attempt byte counts into overall batch percentages
struct ProgressReporter {
    events: UnboundedSender<BatchEvent>,
    index: usize,
    total: usize,
    last: Arc<AtomicU8>,
}

impl ProgressReporter {
    fn new(events: UnboundedSender<BatchEvent>, index: usize, total: usize) -> Self {
        Self {
            events,
            index,
            total,
            last: Arc::new(AtomicU8::new(u8::MAX)),
        }
    }

    fn for_attempt(&self, offset: u64, size: u64) -> ProgressFn {
        let events = self.events.clone();
        let last = self.last.clone();
        let (index, total) = (self.index, self.total);
        Arc::new(move |sent| {
            let segment_pct = if size == 0 {
                100
            } else {
                ((offset + sent).min(size) * 100 / size) as usize
            };
            // 100 is reserved for the terminal success
            let overall = ((index * 100 + segment_pct) / total).min(99) as u8;
            if last.swap(overall, Ordering::Relaxed) != overall {
                let _ = events.send(BatchEvent::Progress(overall));
            }
        })
    }

    fn segment_done(&self) {
        let overall = ((self.index + 1) * 100 / self.total).min(99) as u8;
        if self.last.swap(overall, Ordering::Relaxed) != overall {
            let _ = self.events.send(BatchEvent::Progress(overall));
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
