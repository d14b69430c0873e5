//! LogConsumer - logs record summaries via tracing

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{ContractError, Record, RecordConsumer};
use tracing::{debug, info};

/// Consumer that logs every Nth record for debugging
pub struct LogConsumer {
    name: String,
    every: u64,
    seen: AtomicU64,
}

impl LogConsumer {
    /// Create a new LogConsumer that logs every record
    pub fn new(name: impl Into<String>) -> Self {
        Self::sampled(name, 1)
    }

    /// Create a LogConsumer that only logs one record out of `every`
    pub fn sampled(name: impl Into<String>, every: u64) -> Self {
        Self {
            name: name.into(),
            every: every.max(1),
            seen: AtomicU64::new(0),
        }
    }

    /// Records observed so far
    pub fn seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

impl RecordConsumer for LogConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_record(&self, record: &Record) -> Result<(), ContractError> {
        let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.every == 0 {
            info!(
                consumer = %self.name,
                seen = n,
                timestamp_ms = record.timestamp_ms,
                sensor = %record.sensor_name,
                user_id = %record.user_id,
                "Record received"
            );
        } else {
            debug!(consumer = %self.name, seen = n, "Record received");
        }
        Ok(())
    }
}
