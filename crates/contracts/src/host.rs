//! Host collaborators - recording flag, metadata lookups, clock
//!
//! These are the capabilities the core borrows from the surrounding app.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Local, TimeZone};

/// User id used when none (or a blank one) is configured
pub const DEFAULT_USER_ID: &str = "test";

/// Shared on/off switch controlling whether the log writer persists records
#[derive(Debug, Clone, Default)]
pub struct RecordingFlag(Arc<AtomicBool>);

impl RecordingFlag {
    /// Create a flag in the given state
    pub fn new(recording: bool) -> Self {
        Self(Arc::new(AtomicBool::new(recording)))
    }

    /// Whether recording is on
    pub fn is_recording(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Turn recording on or off
    pub fn set(&self, recording: bool) {
        self.0.store(recording, Ordering::Release);
    }
}

/// Foreground application identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundApp {
    pub name: String,
    pub package: String,
}

impl ForegroundApp {
    /// Identity reported when the foreground app cannot be determined
    pub fn unknown() -> Self {
        Self {
            name: "unknown".to_string(),
            package: String::new(),
        }
    }
}

/// Metadata lookups (user id, foreground app)
pub trait MetadataProvider: Send + Sync {
    /// Current user id
    fn user_id(&self) -> String;

    /// Current foreground application
    fn foreground_app(&self) -> ForegroundApp {
        ForegroundApp::unknown()
    }
}

/// Trim a user id, falling back to [`DEFAULT_USER_ID`] when blank
pub fn normalize_user_id(user_id: &str) -> String {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        DEFAULT_USER_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

/// In-process metadata holder, updated by whoever owns the UI/session
#[derive(Debug)]
pub struct StaticMetadata {
    user_id: RwLock<String>,
    app: RwLock<ForegroundApp>,
}

impl StaticMetadata {
    /// Create with an initial user id
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: RwLock::new(normalize_user_id(user_id)),
            app: RwLock::new(ForegroundApp::unknown()),
        }
    }

    /// Replace the current user id
    pub fn set_user_id(&self, user_id: &str) {
        let mut guard = self.user_id.write().unwrap_or_else(|e| e.into_inner());
        *guard = normalize_user_id(user_id);
    }

    /// Replace the current foreground app
    pub fn set_foreground_app(&self, name: impl Into<String>, package: impl Into<String>) {
        let mut guard = self.app.write().unwrap_or_else(|e| e.into_inner());
        *guard = ForegroundApp {
            name: name.into(),
            package: package.into(),
        };
    }
}

impl MetadataProvider for StaticMetadata {
    fn user_id(&self) -> String {
        self.user_id
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn foreground_app(&self) -> ForegroundApp {
        self.app
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

/// Time source
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> i64;

    /// Local time, used for segment names
    fn now_local(&self) -> DateTime<Local> {
        Local
            .timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_else(Local::now)
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug, Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    /// Move the clock forward
    pub fn advance(&self, delta_ms: i64) {
        self.0.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_user_id_falls_back() {
        assert_eq!(normalize_user_id("   "), DEFAULT_USER_ID);
        assert_eq!(normalize_user_id(" carol "), "carol");

        let metadata = StaticMetadata::new("");
        assert_eq!(metadata.user_id(), DEFAULT_USER_ID);
        metadata.set_user_id("dave");
        assert_eq!(metadata.user_id(), "dave");
    }

    #[test]
    fn test_recording_flag_is_shared() {
        let flag = RecordingFlag::new(false);
        let other = flag.clone();
        other.set(true);
        assert!(flag.is_recording());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
    }
}
