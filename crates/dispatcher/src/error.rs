//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Worker thread could not be started
    #[error("failed to spawn dispatch worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Worker did not finish draining within the shutdown grace period
    #[error("dispatch worker still busy after {waited_ms}ms, detached")]
    ShutdownTimeout { waited_ms: u64 },

    /// Worker thread panicked
    #[error("dispatch worker panicked")]
    WorkerPanicked,
}
