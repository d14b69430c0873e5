//! Segment and upload-copy file names

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use contracts::{CompressionMode, SEGMENT_NAME_MARKER, UPLOAD_COPY_PREFIX};

/// User part of the name when no metadata provider is reachable
pub const DEFAULT_SEGMENT_USER: &str = "default_user";

/// `{user}_sensor_data_{yyyyMMdd_HHmmss_SSS}{ext}`
pub fn segment_file_name(user_id: &str, at: DateTime<Local>, mode: CompressionMode) -> String {
    format!(
        "{}{}{}{}",
        sanitize_user(user_id),
        SEGMENT_NAME_MARKER,
        at.format("%Y%m%d_%H%M%S_%3f"),
        mode.extension()
    )
}

/// `upload_{millis}_{original name}`
pub fn upload_copy_name(original: &Path, now_ms: i64) -> String {
    let name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{UPLOAD_COPY_PREFIX}{now_ms}_{name}")
}

/// Pick a path in `dir` that does not exist yet
///
/// Two rotations inside the same millisecond would otherwise collide.
pub(crate) fn unique_segment_path(
    dir: &Path,
    user_id: &str,
    at: DateTime<Local>,
    mode: CompressionMode,
) -> PathBuf {
    let name = segment_file_name(user_id, at, mode);
    let first = dir.join(&name);
    if !first.exists() {
        return first;
    }

    let stem = &name[..name.len() - mode.extension().len()];
    (1u32..)
        .map(|n| dir.join(format!("{stem}_{n}{}", mode.extension())))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

fn sanitize_user(user_id: &str) -> String {
    let cleaned: String = user_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        DEFAULT_SEGMENT_USER.to_string()
    } else {
        cleaned
    }
}
