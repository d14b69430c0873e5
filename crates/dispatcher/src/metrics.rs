//! Dispatcher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared by the dispatcher, its worker and inline deliveries
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Records accepted by `dispatch`
    dispatched: AtomicU64,
    /// Successful consumer invocations
    delivered: AtomicU64,
    /// Consumer invocations that returned an error or panicked
    consumer_failures: AtomicU64,
    /// Deliveries executed on the producer thread
    inline_deliveries: AtomicU64,
    /// Worker rebuilds after an unexpected teardown
    worker_rebuilds: AtomicU64,
    /// Records absorbed after shutdown
    absorbed: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn inc_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consumer_failures(&self) -> u64 {
        self.consumer_failures.load(Ordering::Relaxed)
    }

    pub fn inc_consumer_failures(&self) {
        self.consumer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inline_deliveries(&self) -> u64 {
        self.inline_deliveries.load(Ordering::Relaxed)
    }

    pub fn inc_inline_deliveries(&self) {
        self.inline_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_rebuilds(&self) -> u64 {
        self.worker_rebuilds.load(Ordering::Relaxed)
    }

    pub fn inc_worker_rebuilds(&self) {
        self.worker_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn absorbed(&self) -> u64 {
        self.absorbed.load(Ordering::Relaxed)
    }

    pub fn inc_absorbed(&self) {
        self.absorbed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            dispatched: self.dispatched(),
            delivered: self.delivered(),
            consumer_failures: self.consumer_failures(),
            inline_deliveries: self.inline_deliveries(),
            worker_rebuilds: self.worker_rebuilds(),
            absorbed: self.absorbed(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub dispatched: u64,
    pub delivered: u64,
    pub consumer_failures: u64,
    pub inline_deliveries: u64,
    pub worker_rebuilds: u64,
    pub absorbed: u64,
}
