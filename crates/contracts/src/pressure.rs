//! Resource pressure reaction contract
//!
//! The monitor that observes host memory pressure lives outside the core.
//! It forwards a [`PressureLevel`] to every component through [`PressureAware`].

use serde::{Deserialize, Serialize};

/// Severity of an external resource-pressure signal (ordered, mildest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    /// Memory is getting tight, nothing to release yet
    Low,
    /// Release caches and idle resources
    Moderate,
    /// Release everything that is not required to keep recording
    Critical,
    /// The process is about to be reclaimed
    Complete,
}

impl PressureLevel {
    /// Map a host trim level (Android `ComponentCallbacks2` numbering)
    ///
    /// Anything at or above `TRIM_MEMORY_RUNNING_CRITICAL` (15) is treated as
    /// critical; `TRIM_MEMORY_COMPLETE` (80) and above is complete.
    pub fn from_trim_level(level: i32) -> Self {
        match level {
            l if l >= 80 => Self::Complete,
            l if l >= 15 => Self::Critical,
            l if l >= 10 => Self::Moderate,
            _ => Self::Low,
        }
    }

    /// Critical or worse
    pub fn is_critical(self) -> bool {
        self >= Self::Critical
    }
}

/// Component-side hook for resource pressure
pub trait PressureAware {
    /// React to a pressure signal. Must not block for long.
    fn on_resource_pressure(&self, level: PressureLevel);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_level_mapping() {
        assert_eq!(PressureLevel::from_trim_level(5), PressureLevel::Low);
        assert_eq!(PressureLevel::from_trim_level(10), PressureLevel::Moderate);
        assert_eq!(PressureLevel::from_trim_level(15), PressureLevel::Critical);
        assert_eq!(PressureLevel::from_trim_level(60), PressureLevel::Critical);
        assert_eq!(PressureLevel::from_trim_level(80), PressureLevel::Complete);
        assert!(PressureLevel::Complete.is_critical());
        assert!(!PressureLevel::Moderate.is_critical());
    }
}
