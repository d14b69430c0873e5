//! EventDispatcher - fan-out from one producer to registered consumers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_channel::{Sender, TrySendError};
use tracing::{debug, error, info, instrument, trace, warn};

use contracts::{
    DispatcherSettings, OverflowPolicy, PressureAware, PressureLevel, Record, RecordConsumer,
};

use crate::error::DispatcherError;
use crate::handle::{ConsumerList, Delivery, WorkerHandle};
use crate::metrics::{DispatchMetrics, MetricsSnapshot};

/// Bounded wait for the worker to drain on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Dispatcher lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    /// Terminal
    Shutdown,
}

/// Fans every record out to all registered consumers on a background worker.
///
/// Records are never dropped. When the worker queue is full the configured
/// [`OverflowPolicy`] decides: `ExecuteInline` delivers on the caller thread
/// (a record delivered inline may overtake records still queued), while
/// `BlockCaller` waits for room and keeps arrival order.
pub struct EventDispatcher {
    /// Copy-on-write consumer list; each delivery keeps the snapshot it was created with
    consumers: Mutex<ConsumerList>,
    worker: Mutex<Option<WorkerHandle>>,
    active: AtomicBool,
    collecting: AtomicBool,
    settings: DispatcherSettings,
    metrics: Arc<DispatchMetrics>,
}

impl EventDispatcher {
    /// Create a dispatcher and start its worker
    #[instrument(
        name = "event_dispatcher_new",
        fields(
            queue_capacity = settings.queue_capacity,
            overflow_policy = ?settings.overflow_policy
        )
    )]
    pub fn new(settings: DispatcherSettings) -> Result<Self, DispatcherError> {
        let metrics = Arc::new(DispatchMetrics::new());
        let worker = WorkerHandle::spawn(settings.queue_capacity, metrics.clone())?;

        info!("Event dispatcher started");

        Ok(Self {
            consumers: Mutex::new(Arc::new(Vec::new())),
            worker: Mutex::new(Some(worker)),
            active: AtomicBool::new(true),
            collecting: AtomicBool::new(true),
            settings,
            metrics,
        })
    }

    /// Register a consumer. Returns false if it was already registered.
    pub fn register(&self, consumer: Arc<dyn RecordConsumer>) -> bool {
        let mut consumers = lock(&self.consumers);
        if consumers.iter().any(|c| same_consumer(c, &consumer)) {
            debug!(consumer = consumer.name(), "Consumer already registered");
            return false;
        }

        let mut next = Vec::with_capacity(consumers.len() + 1);
        next.extend(consumers.iter().cloned());
        info!(consumer = consumer.name(), "Consumer registered");
        next.push(consumer);
        *consumers = Arc::new(next);
        true
    }

    /// Unregister a consumer. Returns false if it was not registered.
    pub fn unregister(&self, consumer: &Arc<dyn RecordConsumer>) -> bool {
        let mut consumers = lock(&self.consumers);
        if !consumers.iter().any(|c| same_consumer(c, consumer)) {
            return false;
        }

        let next: Vec<_> = consumers
            .iter()
            .filter(|c| !same_consumer(c, consumer))
            .cloned()
            .collect();
        *consumers = Arc::new(next);
        info!(consumer = consumer.name(), "Consumer unregistered");
        true
    }

    /// Number of registered consumers
    pub fn consumer_count(&self) -> usize {
        lock(&self.consumers).len()
    }

    /// Hand a record to every registered consumer.
    ///
    /// Never fails and never drops. After shutdown the record is absorbed.
    pub fn dispatch(&self, record: Record) {
        if !self.active.load(Ordering::Acquire) {
            self.metrics.inc_absorbed();
            trace!(
                timestamp_ms = record.timestamp_ms,
                "Dispatch after shutdown absorbed"
            );
            return;
        }

        let consumers = lock(&self.consumers).clone();
        self.metrics.inc_dispatched();

        let delivery = Delivery::new(record, consumers);
        let inline = match self.current_sender() {
            Some(tx) => self.submit(&tx, delivery),
            None => self.submit_after_rebuild(delivery),
        };
        observability::record_record_dispatched(inline);
    }

    /// Try the live worker; returns whether the delivery ran inline
    fn submit(&self, tx: &Sender<Delivery>, delivery: Delivery) -> bool {
        let rejected = match self.settings.overflow_policy {
            OverflowPolicy::ExecuteInline => match tx.try_send(delivery) {
                Ok(()) => None,
                Err(TrySendError::Full(delivery)) => {
                    trace!(queue_len = tx.len(), "Dispatch queue full, delivering inline");
                    return self.run_inline(delivery);
                }
                Err(TrySendError::Closed(delivery)) => Some(delivery),
            },
            OverflowPolicy::BlockCaller => match tx.send_blocking(delivery) {
                Ok(()) => None,
                Err(e) => Some(e.into_inner()),
            },
        };

        match rejected {
            None => {
                self.metrics.set_queue_len(tx.len());
                false
            }
            Some(delivery) => self.submit_after_rebuild(delivery),
        }
    }

    /// Worker is gone while still active: rebuild once, retry, else run inline
    fn submit_after_rebuild(&self, delivery: Delivery) -> bool {
        let Some(tx) = self.rebuild_worker() else {
            return self.run_inline(delivery);
        };

        let retried = match self.settings.overflow_policy {
            OverflowPolicy::ExecuteInline => tx.try_send(delivery).map_err(|e| e.into_inner()),
            OverflowPolicy::BlockCaller => tx.send_blocking(delivery).map_err(|e| e.into_inner()),
        };

        match retried {
            Ok(()) => false,
            Err(delivery) => self.run_inline(delivery),
        }
    }

    fn run_inline(&self, delivery: Delivery) -> bool {
        self.metrics.inc_inline_deliveries();
        delivery.run(&self.metrics);
        true
    }

    fn current_sender(&self) -> Option<Sender<Delivery>> {
        lock(&self.worker)
            .as_ref()
            .filter(|w| !w.is_closed())
            .map(WorkerHandle::sender)
    }

    #[instrument(name = "event_dispatcher_rebuild_worker", skip(self))]
    fn rebuild_worker(&self) -> Option<Sender<Delivery>> {
        let mut worker = lock(&self.worker);
        if !self.active.load(Ordering::Acquire) {
            return None;
        }

        // Another producer may have rebuilt it already
        if let Some(live) = worker.as_ref().filter(|w| !w.is_closed()) {
            return Some(live.sender());
        }

        match WorkerHandle::spawn(self.settings.queue_capacity, self.metrics.clone()) {
            Ok(fresh) => {
                self.metrics.inc_worker_rebuilds();
                warn!("Dispatch worker was torn down, rebuilt");
                let tx = fresh.sender();
                // The old thread exits on its own once its closed queue is drained
                *worker = Some(fresh);
                Some(tx)
            }
            Err(e) => {
                error!(error = %e, "Failed to rebuild dispatch worker");
                None
            }
        }
    }

    /// Stop accepting records, drain the queue and join the worker.
    ///
    /// Idempotent. Waits at most [`SHUTDOWN_GRACE`] for the drain.
    #[instrument(name = "event_dispatcher_shutdown", skip(self))]
    pub fn shutdown(&self) -> Result<(), DispatcherError> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.shutdown(SHUTDOWN_GRACE)?;
        }

        info!(
            dispatched = self.metrics.dispatched(),
            inline = self.metrics.inline_deliveries(),
            failures = self.metrics.consumer_failures(),
            "Event dispatcher shut down"
        );
        Ok(())
    }

    pub fn state(&self) -> DispatcherState {
        if self.active.load(Ordering::Acquire) {
            DispatcherState::Running
        } else {
            DispatcherState::Shutdown
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == DispatcherState::Running
    }

    /// Whether the host should keep collecting
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::Acquire)
    }

    pub fn set_collecting(&self, collecting: bool) {
        self.collecting.store(collecting, Ordering::Release);
        debug!(collecting, "Collecting flag updated");
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Close the worker queue without marking the dispatcher inactive
    #[cfg(test)]
    fn tear_down_worker(&self) {
        if let Some(worker) = lock(&self.worker).as_ref() {
            worker.sender().close();
        }
    }
}

impl PressureAware for EventDispatcher {
    fn on_resource_pressure(&self, level: PressureLevel) {
        if !level.is_critical() {
            debug!(?level, "Resource pressure noted");
            return;
        }

        warn!(?level, "Resource pressure, stopping collection");
        self.set_collecting(false);

        if level == PressureLevel::Complete {
            if let Err(e) = self.shutdown() {
                error!(error = %e, "Dispatcher shutdown under pressure failed");
            }
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "Dispatcher shutdown on drop failed");
        }
    }
}

fn same_consumer(a: &Arc<dyn RecordConsumer>, b: &Arc<dyn RecordConsumer>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Poisoning only means a consumer panicked on another thread; the data is still valid
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
