//! Startup scan and recovery of existing segments

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use contracts::{is_segment_file_name, is_upload_copy_name, CompressionMode};
use tracing::{debug, info, warn};

use crate::error::LogError;

/// One segment file found on disk
#[derive(Debug, Clone)]
pub(crate) struct ScannedSegment {
    pub path: PathBuf,
    pub size: u64,
    pub modified_ms: i64,
}

/// Result of the startup scan
#[derive(Debug, Default)]
pub(crate) struct Recovered {
    /// Plain segment to keep appending to
    pub resume: Option<PathBuf>,
    /// Segments to queue for upload, oldest first
    pub sealed: Vec<PathBuf>,
}

/// Milliseconds since epoch of the file's last modification, 0 if unknown
pub(crate) fn modified_ms(path: &Path) -> i64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// List segment files in `dir`, newest first. Upload copies are skipped.
pub(crate) fn scan_segments(dir: &Path) -> Result<Vec<ScannedSegment>, LogError> {
    let entries = fs::read_dir(dir).map_err(|e| LogError::io(dir, e))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LogError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_segment_file_name(name) || is_upload_copy_name(name) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let path = entry.path();
        found.push(ScannedSegment {
            modified_ms: modified_ms(&path),
            size: meta.len(),
            path,
        });
    }

    found.sort_by(|a, b| {
        b.modified_ms
            .cmp(&a.modified_ms)
            .then_with(|| b.path.cmp(&a.path))
    });
    Ok(found)
}

/// Delete upload copies left behind by a crash; the originals still hold their data
pub(crate) fn remove_stale_upload_copies(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_upload_copy_name(name) && is_segment_file_name(name) {
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(file = name, "Removed stale upload copy"),
                Err(e) => warn!(file = name, error = %e, "Failed to remove stale upload copy"),
            }
        }
    }
}

/// Classify existing segments.
///
/// Zero-byte files are deleted. The newest non-empty file below `max_bytes`
/// is resumed when it is plain and the writer runs in plain mode; every other
/// file is sealed.
pub(crate) fn recover(
    dir: &Path,
    mode: CompressionMode,
    max_bytes: u64,
) -> Result<Recovered, LogError> {
    remove_stale_upload_copies(dir);

    let mut recovered = Recovered::default();
    let mut candidate_taken = false;

    for segment in scan_segments(dir)? {
        if segment.size == 0 {
            match fs::remove_file(&segment.path) {
                Ok(()) => debug!(segment = %segment.path.display(), "Deleted empty segment"),
                Err(e) => warn!(
                    segment = %segment.path.display(),
                    error = %e,
                    "Failed to delete empty segment"
                ),
            }
            continue;
        }

        if !candidate_taken && segment.size < max_bytes {
            candidate_taken = true;
            let resumable = mode == CompressionMode::Plain
                && CompressionMode::from_path(&segment.path) == Some(CompressionMode::Plain);
            if resumable {
                info!(
                    segment = %segment.path.display(),
                    bytes = segment.size,
                    "Resuming plain segment"
                );
                recovered.resume = Some(segment.path);
                continue;
            }
        }

        recovered.sealed.push(segment.path);
    }

    // Scan order is newest first; the upload queue is oldest first
    recovered.sealed.reverse();

    info!(
        dir = %dir.display(),
        resumed = recovered.resume.is_some(),
        sealed = recovered.sealed.len(),
        "Segment recovery complete"
    );
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    fn touch(path: &Path, content: &[u8], age_secs: u64) {
        fs::write(path, content).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[test]
    fn test_scan_sorts_newest_first_and_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("u_sensor_data_old.jsonl"), b"a\n", 300);
        touch(&dir.path().join("u_sensor_data_new.jsonl"), b"b\n", 10);
        touch(&dir.path().join("notes.txt"), b"c\n", 5);
        touch(&dir.path().join("upload_1_u_sensor_data_new.jsonl"), b"b\n", 1);

        let scanned = scan_segments(dir.path()).unwrap();
        let names: Vec<_> = scanned
            .iter()
            .map(|s| s.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["u_sensor_data_new.jsonl", "u_sensor_data_old.jsonl"]);
    }

    #[test]
    fn test_recover_plain_resumes_newest_under_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("u_sensor_data_big.jsonl");
        let small = dir.path().join("u_sensor_data_small.jsonl");
        let older = dir.path().join("sensor_data_legacy.jsonl");
        let empty = dir.path().join("u_sensor_data_empty.jsonl");
        touch(&older, b"x\n", 500);
        touch(&small, b"xy\n", 100);
        touch(&big, &[b'z'; 64], 10);
        touch(&empty, b"", 1);

        let recovered = recover(dir.path(), CompressionMode::Plain, 32).unwrap();

        assert_eq!(recovered.resume.as_deref(), Some(small.as_path()));
        assert_eq!(recovered.sealed, vec![older, big]);
        assert!(!empty.exists());
    }

    #[test]
    fn test_recover_gzip_seals_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let gz = dir.path().join("u_sensor_data_a.jsonl.gz");
        touch(&gz, b"\x1f\x8b", 10);

        let recovered = recover(dir.path(), CompressionMode::Gzip, 1024).unwrap();
        assert!(recovered.resume.is_none());
        assert_eq!(recovered.sealed, vec![gz]);
    }

    #[test]
    fn test_plain_file_not_resumed_in_gzip_mode() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("u_sensor_data_a.jsonl");
        touch(&plain, b"x\n", 10);

        let recovered = recover(dir.path(), CompressionMode::Gzip, 1024).unwrap();
        assert!(recovered.resume.is_none());
        assert_eq!(recovered.sealed, vec![plain]);
    }

    #[test]
    fn test_stale_upload_copies_removed() {
        let dir = tempfile::tempdir().unwrap();
        let copy = dir.path().join("upload_17_u_sensor_data_a.jsonl");
        touch(&copy, b"x\n", 1);

        recover(dir.path(), CompressionMode::Plain, 1024).unwrap();
        assert!(!copy.exists());
    }
}
