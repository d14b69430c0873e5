//! # Dispatcher
//!
//! Record fan-out module.
//!
//! Responsibilities:
//! - Accept one `Record` at a time from the producer
//! - Fan-out to every registered `RecordConsumer` on a bounded background worker
//! - Never drop a record: a saturated queue falls back to the configured `OverflowPolicy`
//! - Contain consumer failures so siblings and the producer are unaffected

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{OverflowPolicy, Record, RecordConsumer};
pub use dispatcher::{DispatcherState, EventDispatcher};
pub use error::DispatcherError;
pub use handle::WorkerHandle;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use sinks::LogConsumer;
