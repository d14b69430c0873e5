//! Attempt and batch outcomes, batch observer

use crate::error::TransportError;
use crate::transport::Delivered;

/// Classified result of one transfer attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { confirmation: String },
    /// Timeout, refused/reset connection, DNS, generic I/O
    Retryable { delivered: u64, reason: String },
    /// Unexpected end of stream; restart the segment from zero
    Truncated,
    /// Non-2xx response
    Rejected { status: u16 },
    Cancelled,
    Fatal { reason: String },
}

impl AttemptOutcome {
    pub fn classify(result: Result<Delivered, TransportError>) -> Self {
        match result {
            Ok(delivered) => Self::Success {
                confirmation: delivered.confirmation,
            },
            Err(TransportError::Truncated) => Self::Truncated,
            Err(TransportError::Rejected { status, .. }) => Self::Rejected { status },
            Err(TransportError::Fatal(reason)) => Self::Fatal { reason },
            Err(e) => Self::Retryable {
                delivered: e.delivered(),
                reason: e.to_string(),
            },
        }
    }
}

/// Terminal result of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub fail_count: usize,
    pub cancelled: bool,
    /// Bounded summary of per-segment errors, empty on success
    pub error_summary: String,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.fail_count == 0
    }
}

/// Receives batch progress and exactly one terminal callback
///
/// Called from the coordination task, never from the network task.
pub trait BatchObserver: Send + Sync {
    /// Overall progress, 0-100
    fn on_progress(&self, _percent: u8) {}

    fn on_success(&self, outcome: &BatchOutcome);

    fn on_failure(&self, outcome: &BatchOutcome);
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {
    fn on_success(&self, _outcome: &BatchOutcome) {}

    fn on_failure(&self, _outcome: &BatchOutcome) {}
}

/// Join errors with "; " and cut at `limit` characters, marking the cut with "..."
pub fn summarize_errors(errors: &[String], limit: usize) -> String {
    let joined = errors.join("; ");
    if joined.chars().count() <= limit {
        return joined;
    }
    let mut cut: String = joined.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_transport_errors() {
        assert_eq!(
            AttemptOutcome::classify(Err(TransportError::Timeout { delivered: 7 })),
            AttemptOutcome::Retryable {
                delivered: 7,
                reason: "request timed out".to_string()
            }
        );
        assert_eq!(
            AttemptOutcome::classify(Err(TransportError::Truncated)),
            AttemptOutcome::Truncated
        );
        assert_eq!(
            AttemptOutcome::classify(Err(TransportError::Rejected {
                status: 404,
                body: String::new()
            })),
            AttemptOutcome::Rejected { status: 404 }
        );
        assert!(matches!(
            AttemptOutcome::classify(Err(TransportError::fatal("bad request"))),
            AttemptOutcome::Fatal { .. }
        ));
        assert!(matches!(
            AttemptOutcome::classify(Ok(Delivered {
                status: 200,
                confirmation: "ok".to_string()
            })),
            AttemptOutcome::Success { .. }
        ));
    }

    #[test]
    fn test_summary_truncated() {
        let errors = vec!["x".repeat(300), "y".repeat(300)];
        let summary = summarize_errors(&errors, 500);
        assert_eq!(summary.chars().count(), 503);
        assert!(summary.ends_with("..."));

        let short = summarize_errors(&["a".to_string(), "b".to_string()], 500);
        assert_eq!(short, "a; b");
    }
}
