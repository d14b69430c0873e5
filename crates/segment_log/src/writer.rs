//! LogWriter - the durable log consumer

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use contracts::{
    is_upload_copy_name, Clock, CompressionMode, ContractError, MetadataProvider, PressureAware,
    PressureLevel, Record, RecordConsumer, RecordingFlag, SegmentInfo, SegmentState,
    SegmentStore, StorageConfig,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::LogError;
use crate::naming::{unique_segment_path, upload_copy_name, DEFAULT_SEGMENT_USER};
use crate::recovery::{self, modified_ms};
use crate::segment::ActiveSegment;
use crate::timer;

/// Why a segment was rotated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    Size,
    Timer,
    Forced,
    /// Gzip snapshot for upload
    Snapshot,
    Pressure,
    WriteFailure,
    Shutdown,
}

struct WriterState {
    active: Option<ActiveSegment>,
    /// Sealed segments, oldest first
    sealed: VecDeque<PathBuf>,
    last_forced_rotation: Option<Instant>,
    last_upload_ms: Option<i64>,
    closed: bool,
}

/// Rotating append log. Registered with the dispatcher as a consumer.
///
/// Every stream lifecycle operation (write, rotate, snapshot, retention)
/// serializes on one mutex.
pub struct LogWriter {
    config: StorageConfig,
    recording: RecordingFlag,
    metadata: Weak<dyn MetadataProvider>,
    clock: Arc<dyn Clock>,
    state: Mutex<WriterState>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LogWriter {
    /// Open the storage directory, recover existing segments and start a
    /// writing segment.
    #[instrument(
        name = "log_writer_open",
        skip_all,
        fields(dir = %config.dir.display(), mode = ?config.compression)
    )]
    pub fn open(
        config: StorageConfig,
        recording: RecordingFlag,
        metadata: Weak<dyn MetadataProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LogError> {
        fs::create_dir_all(&config.dir).map_err(|e| LogError::io(&config.dir, e))?;

        let recovered =
            recovery::recover(&config.dir, config.compression, config.max_segment_bytes)?;

        let writer = Self {
            config,
            recording,
            metadata,
            clock,
            state: Mutex::new(WriterState {
                active: None,
                sealed: recovered.sealed.into(),
                last_forced_rotation: None,
                last_upload_ms: None,
                closed: false,
            }),
            timer: Mutex::new(None),
        };

        let active = match recovered.resume {
            Some(path) => match ActiveSegment::reopen_plain(path.clone()) {
                Ok(active) => active,
                Err(e) => {
                    warn!(segment = %path.display(), error = %e, "Cannot reopen segment, sealing it");
                    lock(&writer.state).sealed.push_back(path);
                    writer.open_new_segment()?
                }
            },
            None => writer.open_new_segment()?,
        };
        info!(segment = %active.path().display(), bytes = active.bytes(), "Log writer ready");
        lock(&writer.state).active = Some(active);

        Ok(writer)
    }

    /// Start the periodic rotation timer. Must be called inside a tokio runtime.
    pub fn start_rotation_timer(self: &Arc<Self>) -> Result<(), LogError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| LogError::NoRuntime)?;
        let task = timer::spawn_rotation_timer(
            &runtime,
            Arc::downgrade(self),
            self.config.rotation_interval(),
        );
        if let Some(previous) = lock(&self.timer).replace(task) {
            previous.abort();
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
    }

    /// Append one record. Returns false when recording is off.
    ///
    /// The segment rotates once its size strictly exceeds `max_segment_bytes`;
    /// a segment sitting exactly at the limit keeps receiving records.
    pub fn append(&self, record: &Record) -> Result<bool, LogError> {
        if !self.recording.is_recording() {
            return Ok(false);
        }

        let line = record.to_line()?;
        let mut state = lock(&self.state);
        if state.closed {
            return Err(LogError::Closed);
        }

        let size = self.write_with_retry(&mut state, line.as_bytes())?;
        observability::record_segment_bytes(size);

        if size > self.config.max_segment_bytes {
            // The record is already durable; a failed rotation is retried on the next write
            if let Err(e) = self.rotate_locked(&mut state, RotationReason::Size) {
                error!(error = %e, "Size rotation failed");
            }
        }
        Ok(true)
    }

    fn write_with_retry(&self, state: &mut WriterState, line: &[u8]) -> Result<u64, LogError> {
        let active = self.ensure_active(state)?;
        let first = match active.write_line(line) {
            Ok(size) => return Ok(size),
            Err(e) => e,
        };
        warn!(
            segment = %active.path().display(),
            error = %first,
            "Segment write failed, reopening"
        );

        self.reopen_after_failure(state);

        let active = self.ensure_active(state)?;
        let path = active.path().to_path_buf();
        active
            .write_line(line)
            .map_err(|source| LogError::WriteFailed { path, source })
    }

    fn reopen_after_failure(&self, state: &mut WriterState) {
        let Some(broken) = state.active.take() else {
            return;
        };

        match broken.mode() {
            CompressionMode::Plain => {
                let path = broken.path().to_path_buf();
                drop(broken);
                match ActiveSegment::reopen_plain(path.clone()) {
                    Ok(reopened) => state.active = Some(reopened),
                    Err(e) => warn!(segment = %path.display(), error = %e, "Reopen failed"),
                }
            }
            // A gzip stream cannot be resumed; keep what reached the disk
            CompressionMode::Gzip => {
                if let Err(e) = self.seal_locked(state, broken, RotationReason::WriteFailure) {
                    warn!(error = %e, "Sealing broken gzip segment failed");
                }
            }
        }
    }

    fn ensure_active<'a>(
        &self,
        state: &'a mut WriterState,
    ) -> Result<&'a mut ActiveSegment, LogError> {
        let active = match state.active.take() {
            Some(active) => active,
            None => self.open_new_segment()?,
        };
        Ok(state.active.insert(active))
    }

    fn open_new_segment(&self) -> Result<ActiveSegment, LogError> {
        let user = self
            .metadata
            .upgrade()
            .map(|m| m.user_id())
            .unwrap_or_else(|| DEFAULT_SEGMENT_USER.to_string());
        let path = unique_segment_path(
            &self.config.dir,
            &user,
            self.clock.now_local(),
            self.config.compression,
        );
        let segment = ActiveSegment::create(path.clone(), self.config.compression)
            .map_err(|e| LogError::io(&path, e))?;
        debug!(segment = %path.display(), "Opened new segment");
        Ok(segment)
    }

    /// Finalize a segment and queue it, or delete it if nothing was written
    fn seal_locked(
        &self,
        state: &mut WriterState,
        segment: ActiveSegment,
        reason: RotationReason,
    ) -> Result<(), LogError> {
        let path = segment.path().to_path_buf();

        if segment.is_empty() {
            drop(segment);
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(segment = %path.display(), error = %e, "Failed to delete empty segment");
                }
            }
            debug!(segment = %path.display(), ?reason, "Discarded empty segment");
            return Ok(());
        }

        let result = segment.finish();
        // Whatever reached the disk is worth uploading
        state.sealed.push_back(path.clone());

        match result {
            Ok(bytes) => {
                observability::record_segment_sealed(bytes);
                info!(segment = %path.display(), bytes, ?reason, "Segment sealed");
                Ok(())
            }
            Err(e) => Err(LogError::io(path, e)),
        }
    }

    fn rotate_locked(
        &self,
        state: &mut WriterState,
        reason: RotationReason,
    ) -> Result<(), LogError> {
        let sealed = match state.active.take() {
            Some(active) => self.seal_locked(state, active, reason),
            None => Ok(()),
        };
        state.active = Some(self.open_new_segment()?);
        sealed
    }

    /// Rotate now if recording. Returns whether a rotation happened.
    pub fn rotate_if_recording(&self, reason: RotationReason) -> Result<bool, LogError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(LogError::Closed);
        }
        if !self.recording.is_recording() {
            debug!(?reason, "Not recording, rotation skipped");
            return Ok(false);
        }
        self.rotate_locked(&mut state, reason)?;
        Ok(true)
    }

    /// Explicit rotation, only while recording
    #[instrument(name = "log_writer_force_rotate", skip(self))]
    pub fn force_rotate(&self) -> Result<bool, LogError> {
        self.rotate_if_recording(RotationReason::Forced)
    }

    /// Every sealed segment plus a point-in-time view of the active one.
    ///
    /// Plain: the active file is copied to an `upload_` file and writing
    /// continues on the original. Gzip: the active stream is finalized, which
    /// rotates it, unless a forced rotation happened within
    /// `min_forced_rotation_interval`, in which case it is left out.
    #[instrument(name = "log_writer_pending_segments", skip(self))]
    pub fn pending_segments(&self) -> Result<Vec<PathBuf>, LogError> {
        let mut state = lock(&self.state);

        let snapshot = state
            .active
            .as_ref()
            .filter(|a| !a.is_empty() && !state.closed)
            .map(|a| (a.mode(), a.path().to_path_buf()));

        let mut copy = None;
        match snapshot {
            Some((CompressionMode::Plain, path)) => {
                if let Some(active) = state.active.as_mut() {
                    active.flush().map_err(|e| LogError::io(&path, e))?;
                }
                let target = self
                    .config
                    .dir
                    .join(upload_copy_name(&path, self.clock.now_ms()));
                fs::copy(&path, &target).map_err(|e| LogError::io(&target, e))?;
                debug!(segment = %path.display(), copy = %target.display(), "Snapshot copied");
                copy = Some(target);
            }
            Some((CompressionMode::Gzip, path)) => {
                if self.forced_rotation_allowed(&state) {
                    state.last_forced_rotation = Some(Instant::now());
                    self.rotate_locked(&mut state, RotationReason::Snapshot)?;
                } else {
                    debug!(
                        segment = %path.display(),
                        "Forced rotation too recent, active segment left out"
                    );
                }
            }
            None => {}
        }

        state.sealed.retain(|p| p.exists());
        let mut pending: Vec<PathBuf> = state.sealed.iter().cloned().collect();
        pending.extend(copy);
        Ok(pending)
    }

    fn forced_rotation_allowed(&self, state: &WriterState) -> bool {
        let min = self.config.min_forced_rotation_interval();
        min.is_zero()
            || state
                .last_forced_rotation
                .is_none_or(|last| last.elapsed() >= min)
    }

    /// Forget and delete uploaded segments. Returns how many files were removed.
    #[instrument(name = "log_writer_mark_uploaded", skip_all, fields(count = paths.len()))]
    pub fn mark_uploaded(&self, paths: &[PathBuf]) -> usize {
        let mut state = lock(&self.state);
        let removed = paths
            .iter()
            .filter(|p| self.remove_uploaded_locked(&mut state, p).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to delete uploaded segment");
                false
            }))
            .count();
        state.last_upload_ms = Some(self.clock.now_ms());
        info!(removed, "Uploaded segments removed");
        removed
    }

    fn remove_uploaded_locked(
        &self,
        state: &mut WriterState,
        path: &Path,
    ) -> Result<bool, LogError> {
        if state.active.as_ref().is_some_and(|a| a.path() == path) {
            warn!(segment = %path.display(), "Refusing to delete the writing segment");
            return Ok(false);
        }

        let is_copy = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_upload_copy_name);
        if !is_copy {
            state.sealed.retain(|p| p != path);
        }

        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LogError::io(path, e)),
        }
    }

    /// Delete every segment file except the one being written
    #[instrument(name = "log_writer_clean_all", skip(self))]
    pub fn clean_all(&self) -> Result<usize, LogError> {
        let mut state = lock(&self.state);
        recovery::remove_stale_upload_copies(&self.config.dir);

        let active = state.active.as_ref().map(|a| a.path().to_path_buf());
        let mut removed = 0;
        for segment in recovery::scan_segments(&self.config.dir)? {
            if Some(&segment.path) == active.as_ref() {
                continue;
            }
            match fs::remove_file(&segment.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(segment = %segment.path.display(), error = %e, "Delete failed"),
            }
        }
        state.sealed.clear();
        info!(removed, "All stored segments cleaned");
        Ok(removed)
    }

    /// Keep the `keep` newest non-writing segments, delete older ones
    #[instrument(name = "log_writer_keep_recent", skip(self))]
    pub fn keep_recent(&self, keep: usize) -> Result<usize, LogError> {
        let mut state = lock(&self.state);
        let active = state.active.as_ref().map(|a| a.path().to_path_buf());

        let mut removed = 0;
        let stored = recovery::scan_segments(&self.config.dir)?
            .into_iter()
            .filter(|s| Some(&s.path) != active.as_ref());
        for segment in stored.skip(keep) {
            match fs::remove_file(&segment.path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(segment = %segment.path.display(), error = %e, "Delete failed"),
            }
        }
        state.sealed.retain(|p| p.exists());
        info!(keep, removed, "Old segments trimmed");
        Ok(removed)
    }

    pub fn current_segment_info(&self) -> Option<SegmentInfo> {
        lock(&self.state).active.as_ref().map(ActiveSegment::info)
    }

    /// Writing segment first, then sealed segments oldest first
    pub fn all_segments_info(&self) -> Vec<SegmentInfo> {
        let state = lock(&self.state);
        let mut infos: Vec<SegmentInfo> = state.active.iter().map(ActiveSegment::info).collect();
        infos.extend(state.sealed.iter().filter_map(|path| sealed_info(path)));
        infos
    }

    /// Sealed segments plus the writing one if it holds data
    pub fn unuploaded_count(&self) -> usize {
        let state = lock(&self.state);
        let sealed = state.sealed.iter().filter(|p| p.exists()).count();
        let active = state.active.as_ref().is_some_and(|a| !a.is_empty());
        sealed + usize::from(active)
    }

    pub fn unuploaded_total_bytes(&self) -> u64 {
        let state = lock(&self.state);
        let sealed: u64 = state
            .sealed
            .iter()
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        sealed + state.active.as_ref().map_or(0, ActiveSegment::bytes)
    }

    /// Milliseconds since epoch of the last `mark_uploaded`
    pub fn last_upload_at(&self) -> Option<i64> {
        lock(&self.state).last_upload_ms
    }

    /// Stop the timer and finalize the writing segment. Idempotent.
    #[instrument(name = "log_writer_shutdown", skip(self))]
    pub fn shutdown(&self) -> Result<(), LogError> {
        if let Some(task) = lock(&self.timer).take() {
            task.abort();
        }

        let mut state = lock(&self.state);
        if state.closed {
            return Ok(());
        }
        state.closed = true;

        match state.active.take() {
            Some(active) => self.seal_locked(&mut state, active, RotationReason::Shutdown),
            None => Ok(()),
        }
    }
}

fn sealed_info(path: &Path) -> Option<SegmentInfo> {
    let meta = fs::metadata(path).ok()?;
    Some(SegmentInfo {
        path: path.to_path_buf(),
        mode: CompressionMode::from_path(path)?,
        state: SegmentState::Sealed,
        size_bytes: meta.len(),
        modified_ms: modified_ms(path),
    })
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordConsumer for LogWriter {
    fn name(&self) -> &str {
        "segment_log"
    }

    fn on_record(&self, record: &Record) -> Result<(), ContractError> {
        self.append(record).map(|_| ()).map_err(Into::into)
    }
}

impl SegmentStore for LogWriter {
    fn release(&self, path: &Path) -> Result<(), ContractError> {
        let mut state = lock(&self.state);
        self.remove_uploaded_locked(&mut state, path)
            .map_err(|e| ContractError::segment_release(path.display().to_string(), e.to_string()))?;
        state.last_upload_ms = Some(self.clock.now_ms());
        Ok(())
    }
}

impl PressureAware for LogWriter {
    fn on_resource_pressure(&self, level: PressureLevel) {
        if !level.is_critical() {
            debug!(?level, "Resource pressure noted");
            return;
        }
        match self.rotate_if_recording(RotationReason::Pressure) {
            Ok(rotated) => info!(?level, rotated, "Rotated under resource pressure"),
            Err(e) => warn!(?level, error = %e, "Rotation under resource pressure failed"),
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Log writer shutdown on drop failed");
        }
    }
}
