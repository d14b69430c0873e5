//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::UploadStatsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Input lines read by the feed
    pub lines_read: u64,

    /// Records handed to the dispatcher
    pub records_dispatched: u64,

    /// Lines that were not valid samples
    pub parse_errors: u64,

    /// Samples skipped while collection was paused
    pub paused: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Dispatcher counters at shutdown
    pub dispatch: MetricsSnapshot,

    /// Segments still waiting for upload at shutdown
    pub segments_pending: usize,

    /// Bytes still waiting for upload at shutdown
    pub bytes_pending: u64,

    /// Upload batch aggregator
    pub uploads: UploadStatsAggregator,
}

impl PipelineStats {
    /// Records per second throughput
    pub fn rps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.records_dispatched as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Records dispatched: {}", self.records_dispatched);
        println!("   ├─ Malformed lines: {}", self.parse_errors);
        println!("   ├─ Paused samples: {}", self.paused);
        println!("   └─ Records/s: {:.2}", self.rps());

        println!("\n📨 Dispatcher");
        println!("   ├─ Delivered: {}", self.dispatch.delivered);
        println!("   ├─ Inline deliveries: {}", self.dispatch.inline_deliveries);
        println!("   ├─ Consumer failures: {}", self.dispatch.consumer_failures);
        println!("   └─ Worker rebuilds: {}", self.dispatch.worker_rebuilds);

        println!("\n💾 Storage");
        println!("   ├─ Segments pending: {}", self.segments_pending);
        println!("   └─ Bytes pending: {}", self.bytes_pending);

        if self.uploads.batches > 0 {
            println!("\n{}", self.uploads.summary());
        }

        println!();
    }
}
