//! SimulatedTransport - scripted transport for tests and dry runs

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::transport::{Delivered, ProgressFn, SegmentUpload, UploadTransport};

/// Behaviour of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedStep {
    Succeed,
    /// Server confirms up to `n` bytes, then the attempt fails with a transient I/O error
    FailAfter(u64),
    Timeout,
    Truncate,
    Reject(u16),
    Fatal,
    /// Block until [`SimulatedTransport::release`], then succeed
    Hang,
}

/// What one attempt saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub file_name: String,
    pub offset: u64,
    pub delivered: u64,
}

/// Transport that follows a script, one step per attempt; `Succeed` once the script runs out
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    script: Mutex<VecDeque<SimulatedStep>>,
    attempts: Mutex<Vec<AttemptRecord>>,
    pings: AtomicUsize,
    release: Notify,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(steps: impl IntoIterator<Item = SimulatedStep>) -> Self {
        let transport = Self::new();
        transport.push_steps(steps);
        transport
    }

    pub fn push_steps(&self, steps: impl IntoIterator<Item = SimulatedStep>) {
        lock(&self.script).extend(steps);
    }

    /// Let one hanging attempt finish
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn attempts(&self) -> Vec<AttemptRecord> {
        lock(&self.attempts).clone()
    }

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::Relaxed)
    }

    fn record(&self, upload: &SegmentUpload, delivered: u64) {
        lock(&self.attempts).push(AttemptRecord {
            file_name: upload.file_name.clone(),
            offset: upload.offset,
            delivered,
        });
    }
}

impl UploadTransport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn send(
        &self,
        _endpoint: &Endpoint,
        upload: &SegmentUpload,
        progress: ProgressFn,
    ) -> Result<Delivered, TransportError> {
        let step = lock(&self.script)
            .pop_front()
            .unwrap_or(SimulatedStep::Succeed);
        let remaining = upload.remaining();

        let delivered = match step {
            SimulatedStep::FailAfter(n) => n.min(remaining),
            SimulatedStep::Succeed | SimulatedStep::Hang => remaining,
            _ => 0,
        };
        if step == SimulatedStep::Hang {
            self.release.notified().await;
        }
        if delivered > 0 {
            progress(delivered);
        }
        self.record(upload, delivered);

        match step {
            SimulatedStep::Succeed | SimulatedStep::Hang => Ok(Delivered {
                status: 200,
                confirmation: format!("received {}", upload.file_name),
            }),
            SimulatedStep::FailAfter(_) => Err(TransportError::io("connection reset", delivered)),
            SimulatedStep::Timeout => Err(TransportError::Timeout { delivered: 0 }),
            SimulatedStep::Truncate => Err(TransportError::Truncated),
            SimulatedStep::Reject(status) => Err(TransportError::Rejected {
                status,
                body: String::new(),
            }),
            SimulatedStep::Fatal => Err(TransportError::fatal("simulated fatal error")),
        }
    }

    async fn ping(&self, _endpoint: &Endpoint) -> Result<String, TransportError> {
        self.pings.fetch_add(1, Ordering::Relaxed);
        Ok("pong".to_string())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
