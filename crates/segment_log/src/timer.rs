//! Periodic rotation timer

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::LogError;
use crate::writer::{LogWriter, RotationReason};

/// Rotate every `period` while recording. Ends once the writer is dropped or shut down.
pub(crate) fn spawn_rotation_timer(
    runtime: &Handle,
    writer: Weak<LogWriter>,
    period: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_secs = period.as_secs(), "Rotation timer started");

        loop {
            ticker.tick().await;

            let Some(writer) = writer.upgrade() else {
                break;
            };
            if !writer.is_recording() {
                trace!("Rotation timer fired while not recording");
                continue;
            }

            let rotated = tokio::task::spawn_blocking(move || {
                writer.rotate_if_recording(RotationReason::Timer)
            })
            .await;

            match rotated {
                Ok(Ok(_)) => {}
                Ok(Err(LogError::Closed)) => break,
                Ok(Err(e)) => warn!(error = %e, "Timed rotation failed"),
                Err(e) => warn!(error = %e, "Timed rotation task failed"),
            }
        }

        debug!("Rotation timer stopped");
    })
}
