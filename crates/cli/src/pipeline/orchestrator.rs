//! Pipeline orchestrator - composition root for dispatcher, log writer and uploader.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{
    Clock, MetadataProvider, PipelineConfig, PressureAware, PressureLevel, RecordBuilder,
    RecordConsumer, RecordingFlag, StaticMetadata, SystemClock,
};
use dispatcher::{EventDispatcher, LogConsumer};
use segment_log::LogWriter;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{info, warn};
use uploader::{BatchOutcome, Endpoint, UploadError};

use super::feed::{FeedStats, SensorFeed};
use super::{PendingBatch, PipelineStats, SegmentUploader};

/// Log every Nth record at info level
const TRACE_EVERY: u64 = 1000;

/// Run options coming from the command line
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Sample source (None = stdin)
    pub input: Option<PathBuf>,

    /// Periodic upload interval (None = no periodic uploads)
    pub upload_interval: Option<Duration>,

    /// Upload what is pending when the run ends
    pub final_upload: bool,

    /// Maximum number of records to dispatch (None = unlimited)
    pub max_records: Option<u64>,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// The three components wired together
struct Components {
    // Writer only holds a weak reference
    _metadata: Arc<dyn MetadataProvider>,
    builder: RecordBuilder,
    writer: Arc<LogWriter>,
    dispatcher: Arc<EventDispatcher>,
    uploader: Option<SegmentUploader>,
}

impl Components {
    fn build(config: &PipelineConfig) -> crate::error::Result<Self> {
        let metadata: Arc<dyn MetadataProvider> =
            Arc::new(StaticMetadata::new(&config.identity.user_id));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let writer = Arc::new(LogWriter::open(
            config.storage.clone(),
            RecordingFlag::new(true),
            Arc::downgrade(&metadata),
            clock.clone(),
        )?);
        writer.start_rotation_timer()?;

        let dispatcher = Arc::new(EventDispatcher::new(config.dispatcher.clone())?);
        dispatcher.register(writer.clone() as Arc<dyn RecordConsumer>);
        dispatcher.register(Arc::new(LogConsumer::sampled("feed_trace", TRACE_EVERY)));

        let uploader = match &config.upload.base_url {
            Some(url) => {
                let endpoint = Endpoint::parse(url)?;
                Some(SegmentUploader::new(&config.upload, endpoint, writer.clone())?)
            }
            None => None,
        };

        Ok(Self {
            builder: RecordBuilder::new(metadata.clone(), clock),
            _metadata: metadata,
            writer,
            dispatcher,
            uploader,
        })
    }

    /// Forward a pressure signal to every component
    fn on_resource_pressure(&self, level: PressureLevel) {
        self.dispatcher.on_resource_pressure(level);
        self.writer.on_resource_pressure(level);
        if let Some(uploader) = &self.uploader {
            uploader.coordinator().on_resource_pressure(level);
        }
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    options: RunOptions,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig, options: RunOptions) -> Self {
        Self { config, options }
    }

    /// Run until the input ends, the timeout fires or `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();

        if let Some(port) = self.options.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let components = Components::build(&self.config).context("Failed to build pipeline")?;
        info!(
            dir = %components.writer.dir().display(),
            compression = ?self.config.storage.compression,
            uploads = components.uploader.is_some(),
            "Pipeline components ready"
        );
        if self.options.upload_interval.is_some() && components.uploader.is_none() {
            warn!("Upload interval set but no endpoint configured, uploads disabled");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let feed = SensorFeed {
            input: self.options.input.clone(),
            max_records: self.options.max_records,
            stop: stop.clone(),
        };
        let feed_done = feed
            .spawn(components.builder.clone(), components.dispatcher.clone())
            .context("Failed to start sensor feed")?;

        let mut stats = PipelineStats::default();
        info!("Pipeline running");
        let feed_stats = self
            .drive(&components, feed_done, shutdown, &mut stats)
            .await;
        stop.store(true, Ordering::Relaxed);

        stats.lines_read = feed_stats.lines;
        stats.records_dispatched = feed_stats.records;
        stats.parse_errors = feed_stats.parse_errors;
        stats.paused = feed_stats.paused;

        self.shutdown(components, &mut stats).await?;
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            records = stats.records_dispatched,
            "Pipeline shutdown complete"
        );
        Ok(stats)
    }

    /// Main loop. Periodic upload batches run alongside the other arms, so
    /// pressure and shutdown still reach a batch that is in flight.
    async fn drive(
        &self,
        components: &Components,
        mut feed_done: oneshot::Receiver<FeedStats>,
        shutdown: impl Future<Output = ()>,
        stats: &mut PipelineStats,
    ) -> FeedStats {
        let mut upload_ticker = self.options.upload_interval.map(|period| {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut pressure = PressureSignal::new();
        let mut in_flight: Option<PendingBatch> = None;
        let mut interrupted = false;
        let deadline = sleep_or_pending(self.options.timeout);
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        let feed_stats = loop {
            tokio::select! {
                result = &mut feed_done => {
                    break result.unwrap_or_else(|_| {
                        warn!("Sensor feed ended without reporting");
                        FeedStats::default()
                    });
                }
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping pipeline...");
                    interrupted = true;
                    break FeedStats::default();
                }
                _ = &mut deadline => {
                    warn!("Pipeline timed out");
                    interrupted = true;
                    break FeedStats::default();
                }
                level = pressure.recv() => {
                    components.on_resource_pressure(level);
                }
                outcome = wait_batch(&mut in_flight) => {
                    if let Some(batch) = in_flight.take() {
                        settle_batch(components, batch, outcome, stats);
                    }
                }
                _ = next_tick(&mut upload_ticker), if in_flight.is_none() => {
                    if let Some(uploader) = &components.uploader {
                        match uploader.start_pending(&mut stats.uploads).await {
                            Ok(batch) => in_flight = batch,
                            Err(e) => warn!(error = %e, "Periodic upload failed"),
                        }
                    }
                }
            }
        };

        if let Some(mut batch) = in_flight.take() {
            let outcome = if interrupted {
                batch.cancel();
                batch.wait().await
            } else {
                info!("Waiting for the running upload batch");
                tokio::select! {
                    outcome = batch.wait() => outcome,
                    _ = &mut shutdown => {
                        warn!("Received shutdown signal, cancelling upload batch");
                        batch.cancel();
                        batch.wait().await
                    }
                    _ = &mut deadline => {
                        warn!("Pipeline timed out, cancelling upload batch");
                        batch.cancel();
                        batch.wait().await
                    }
                }
            };
            settle_batch(components, batch, outcome, stats);
        }

        feed_stats
    }

    /// Drain the dispatcher, optionally upload, then seal the writing segment
    async fn shutdown(&self, components: Components, stats: &mut PipelineStats) -> Result<()> {
        info!("Shutting down pipeline...");

        let dispatcher = components.dispatcher.clone();
        tokio::task::spawn_blocking(move || dispatcher.shutdown())
            .await
            .context("Dispatcher shutdown task failed")?
            .context("Dispatcher did not drain")?;
        stats.dispatch = components.dispatcher.metrics();

        if self.options.final_upload {
            if let Some(uploader) = &components.uploader {
                match uploader.upload_pending(&mut stats.uploads).await {
                    Ok(Some(outcome)) => info!(
                        success = outcome.success_count,
                        failed = outcome.fail_count,
                        "Final upload finished"
                    ),
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Final upload failed"),
                }
            }
        }

        let writer = components.writer.clone();
        tokio::task::spawn_blocking(move || writer.shutdown())
            .await
            .context("Log writer shutdown task failed")?
            .context("Log writer shutdown failed")?;
        stats.segments_pending = components.writer.unuploaded_count();
        stats.bytes_pending = components.writer.unuploaded_total_bytes();
        Ok(())
    }
}

async fn wait_batch(batch: &mut Option<PendingBatch>) -> Result<BatchOutcome, UploadError> {
    match batch {
        Some(batch) => batch.wait().await,
        None => std::future::pending().await,
    }
}

fn settle_batch(
    components: &Components,
    batch: PendingBatch,
    outcome: Result<BatchOutcome, UploadError>,
    stats: &mut PipelineStats,
) {
    let Some(uploader) = &components.uploader else {
        return;
    };
    match uploader.finish(batch, outcome, &mut stats.uploads) {
        Ok(outcome) => info!(
            success = outcome.success_count,
            failed = outcome.fail_count,
            cancelled = outcome.cancelled,
            "Periodic upload finished"
        ),
        Err(e) => warn!(error = %e, "Periodic upload failed"),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_or_pending(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// `SIGUSR1` = critical pressure, `SIGUSR2` = moderate
struct PressureSignal {
    #[cfg(unix)]
    critical: Option<tokio::signal::unix::Signal>,
    #[cfg(unix)]
    moderate: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl PressureSignal {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind| match signal(kind) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "Cannot install pressure signal handler");
                None
            }
        };
        Self {
            critical: install(SignalKind::user_defined1()),
            moderate: install(SignalKind::user_defined2()),
        }
    }

    async fn recv(&mut self) -> PressureLevel {
        tokio::select! {
            _ = wait_signal(&mut self.critical) => PressureLevel::Critical,
            _ = wait_signal(&mut self.moderate) => PressureLevel::Moderate,
        }
    }
}

#[cfg(unix)]
async fn wait_signal(signal: &mut Option<tokio::signal::unix::Signal>) {
    if let Some(s) = signal {
        if s.recv().await.is_some() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(not(unix))]
impl PressureSignal {
    fn new() -> Self {
        Self {}
    }

    async fn recv(&mut self) -> PressureLevel {
        std::future::pending().await
    }
}
