//! Sensor feed - JSON-line samples pushed into the dispatcher from a producer thread

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use contracts::{RecordBuilder, SensorSample};
use dispatcher::EventDispatcher;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

const FEED_THREAD_NAME: &str = "sensor-feed";

/// Counters of one feed run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub lines: u64,
    pub records: u64,
    pub parse_errors: u64,
    /// Samples dropped while collection was paused by resource pressure
    pub paused: u64,
}

/// Where samples come from and when to stop
pub struct SensorFeed {
    pub input: Option<PathBuf>,
    pub max_records: Option<u64>,
    pub stop: Arc<AtomicBool>,
}

impl SensorFeed {
    /// Start the producer thread. The receiver resolves when the input ends.
    ///
    /// Stdin reads cannot be interrupted, so the thread is detached; `stop`
    /// is honoured at the next line.
    pub fn spawn(
        self,
        builder: RecordBuilder,
        dispatcher: Arc<EventDispatcher>,
    ) -> io::Result<oneshot::Receiver<FeedStats>> {
        let file = self.input.as_ref().map(File::open).transpose()?;
        let (done_tx, done_rx) = oneshot::channel();

        thread::Builder::new()
            .name(FEED_THREAD_NAME.to_string())
            .spawn(move || {
                let stats = match file {
                    Some(file) => self.run(BufReader::new(file), &builder, &dispatcher),
                    None => self.run(io::stdin().lock(), &builder, &dispatcher),
                };
                let _ = done_tx.send(stats);
            })?;

        Ok(done_rx)
    }

    fn run(
        &self,
        reader: impl BufRead,
        builder: &RecordBuilder,
        dispatcher: &EventDispatcher,
    ) -> FeedStats {
        let stats = feed_lines(reader, builder, dispatcher, self.max_records, &self.stop);
        info!(
            lines = stats.lines,
            records = stats.records,
            parse_errors = stats.parse_errors,
            paused = stats.paused,
            "Sensor feed finished"
        );
        stats
    }
}

/// Parse samples line by line and dispatch them
pub fn feed_lines(
    reader: impl BufRead,
    builder: &RecordBuilder,
    dispatcher: &EventDispatcher,
    max_records: Option<u64>,
    stop: &AtomicBool,
) -> FeedStats {
    let mut stats = FeedStats::default();

    for line in reader.lines() {
        if stop.load(Ordering::Relaxed) {
            debug!("Sensor feed stopped");
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Sensor feed read failed");
                break;
            }
        };
        stats.lines += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let sample: SensorSample = match serde_json::from_str(trimmed) {
            Ok(sample) => sample,
            Err(e) => {
                stats.parse_errors += 1;
                debug!(line = stats.lines, error = %e, "Skipping malformed sample");
                continue;
            }
        };
        if !dispatcher.is_collecting() {
            stats.paused += 1;
            continue;
        }

        dispatcher.dispatch(builder.build(sample));
        stats.records += 1;

        if max_records.is_some_and(|max| stats.records >= max) {
            info!(records = stats.records, "Reached max records limit");
            break;
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ContractError, DispatcherSettings, FixedClock, Record, RecordConsumer, StaticMetadata,
    };
    use std::io::Cursor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<Record>>,
    }

    impl RecordConsumer for Collect {
        fn name(&self) -> &str {
            "collect"
        }

        fn on_record(&self, record: &Record) -> Result<(), ContractError> {
            self.seen.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn setup() -> (RecordBuilder, EventDispatcher, Arc<Collect>) {
        let builder = RecordBuilder::new(
            Arc::new(StaticMetadata::new("alice")),
            Arc::new(FixedClock::new(1_700_000_000_000)),
        );
        let dispatcher = EventDispatcher::new(DispatcherSettings::default()).unwrap();
        let collect = Arc::new(Collect::default());
        dispatcher.register(collect.clone());
        (builder, dispatcher, collect)
    }

    const INPUT: &str = r#"{"sensor_name":"accelerometer","x":0.1,"y":0.2,"z":9.8,"accuracy":3}

not json
{"sensor_name":"gyroscope","x":1.0,"y":0.0,"z":-1.0}
"#;

    #[test]
    fn test_feed_dispatches_valid_lines() {
        let (builder, dispatcher, collect) = setup();
        let stop = AtomicBool::new(false);

        let stats = feed_lines(Cursor::new(INPUT), &builder, &dispatcher, None, &stop);
        dispatcher.shutdown().unwrap();

        assert_eq!(stats.lines, 4);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.parse_errors, 1);

        let seen = collect.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].sensor_name, "accelerometer");
        assert_eq!(seen[0].user_id, "alice");
        assert_eq!(seen[1].accuracy, 0);
    }

    #[test]
    fn test_feed_honours_max_records_and_stop() {
        let (builder, dispatcher, _collect) = setup();
        let stop = AtomicBool::new(false);
        let stats = feed_lines(Cursor::new(INPUT), &builder, &dispatcher, Some(1), &stop);
        assert_eq!(stats.records, 1);

        stop.store(true, Ordering::Relaxed);
        let stats = feed_lines(Cursor::new(INPUT), &builder, &dispatcher, None, &stop);
        assert_eq!(stats.lines, 0);
    }

    #[test]
    fn test_feed_pauses_when_not_collecting() {
        let (builder, dispatcher, collect) = setup();
        dispatcher.set_collecting(false);
        let stop = AtomicBool::new(false);

        let stats = feed_lines(Cursor::new(INPUT), &builder, &dispatcher, None, &stop);
        dispatcher.shutdown().unwrap();

        assert_eq!(stats.paused, 2);
        assert_eq!(stats.records, 0);
        assert!(collect.seen.lock().unwrap().is_empty());
    }
}
