//! WorkerHandle - bounded delivery queue drained by one background thread

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use async_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, instrument, warn};

use contracts::{Record, RecordConsumer};

use crate::error::DispatcherError;
use crate::metrics::DispatchMetrics;

/// Consumer list shared between the dispatcher and in-flight deliveries
pub type ConsumerList = Arc<Vec<Arc<dyn RecordConsumer>>>;

const WORKER_THREAD_NAME: &str = "dispatch-worker";

/// One record bound to the consumer snapshot taken when it was dispatched
pub struct Delivery {
    record: Record,
    consumers: ConsumerList,
}

impl Delivery {
    pub fn new(record: Record, consumers: ConsumerList) -> Self {
        Self { record, consumers }
    }

    /// Invoke every consumer, each inside its own fault boundary
    pub fn run(self, metrics: &DispatchMetrics) {
        for consumer in self.consumers.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| consumer.on_record(&self.record)));
            match outcome {
                Ok(Ok(())) => metrics.inc_delivered(),
                Ok(Err(e)) => {
                    metrics.inc_consumer_failures();
                    observability::record_consumer_failure(consumer.name());
                    error!(
                        consumer = consumer.name(),
                        timestamp_ms = self.record.timestamp_ms,
                        error = %e,
                        "Consumer failed"
                    );
                }
                Err(payload) => {
                    metrics.inc_consumer_failures();
                    observability::record_consumer_failure(consumer.name());
                    error!(
                        consumer = consumer.name(),
                        timestamp_ms = self.record.timestamp_ms,
                        panic = panic_message(payload.as_ref()),
                        "Consumer panicked"
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Handle to a running delivery worker
pub struct WorkerHandle {
    /// Channel to send deliveries to the worker
    tx: Sender<Delivery>,
    /// Worker thread handle
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Create a new WorkerHandle and spawn the worker thread
    pub fn spawn(
        queue_capacity: usize,
        metrics: Arc<DispatchMetrics>,
    ) -> Result<Self, DispatcherError> {
        let (tx, rx) = bounded(queue_capacity.max(1));

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker_loop(rx, metrics))
            .map_err(DispatcherError::WorkerSpawn)?;

        Ok(Self { tx, thread })
    }

    /// Sender clone used to submit without holding the dispatcher lock
    pub fn sender(&self) -> Sender<Delivery> {
        self.tx.clone()
    }

    /// Whether the worker can no longer accept deliveries
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Current queue occupancy
    pub fn queue_len(&self) -> usize {
        self.tx.len()
    }

    /// Stop accepting deliveries, drain what is queued and join the worker
    #[instrument(name = "worker_handle_shutdown", skip(self))]
    pub fn shutdown(self, grace: Duration) -> Result<(), DispatcherError> {
        // Queued deliveries can still be received after close
        self.tx.close();

        let started = Instant::now();
        while !self.thread.is_finished() {
            if started.elapsed() >= grace {
                warn!(pending = self.tx.len(), "Dispatch worker did not drain in time");
                return Err(DispatcherError::ShutdownTimeout {
                    waited_ms: grace.as_millis() as u64,
                });
            }
            thread::sleep(Duration::from_millis(5));
        }

        self.thread
            .join()
            .map_err(|_| DispatcherError::WorkerPanicked)?;
        debug!("WorkerHandle shutdown complete");
        Ok(())
    }
}

/// Worker loop that drains deliveries in arrival order
fn worker_loop(rx: Receiver<Delivery>, metrics: Arc<DispatchMetrics>) {
    debug!("Dispatch worker started");

    while let Ok(delivery) = rx.recv_blocking() {
        metrics.set_queue_len(rx.len());
        delivery.run(&metrics);
    }

    debug!("Dispatch worker stopped");
}
