//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 分发器 -> 日志写入器的无丢失验证
//! - 日志写入器 -> 上传协调器的端到端流程（模拟传输，无需服务器）
//! - 跨批次断点续传与资源压力联动

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashSet;
    use std::io::{BufRead, BufReader, Read};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::{
        CompressionMode, DeleteOnRelease, DispatcherSettings, FixedClock, MetadataProvider,
        OverflowPolicy, PressureAware, PressureLevel, Record, RecordBuilder, RecordingFlag,
        SensorSample, StaticMetadata, StorageConfig, SystemClock, UploadSettings,
    };
    use dispatcher::EventDispatcher;
    use flate2::read::GzDecoder;
    use segment_log::LogWriter;
    use uploader::simulated::{SimulatedStep, SimulatedTransport};
    use uploader::{BatchObserver, BatchOutcome, Endpoint, NoopObserver, UploadCoordinator};

    struct Harness {
        dir: PathBuf,
        _metadata: Arc<dyn MetadataProvider>,
        builder: RecordBuilder,
        writer: Arc<LogWriter>,
        dispatcher: Arc<EventDispatcher>,
        // Dropped last so the writer can still seal on drop
        _tmp: tempfile::TempDir,
    }

    fn harness(mode: CompressionMode, max_segment_bytes: u64, queue_capacity: usize) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("segments");
        let metadata: Arc<dyn MetadataProvider> = Arc::new(StaticMetadata::new("e2e"));

        let writer = Arc::new(
            LogWriter::open(
                StorageConfig {
                    dir: dir.clone(),
                    compression: mode,
                    max_segment_bytes,
                    ..StorageConfig::default()
                },
                RecordingFlag::new(true),
                Arc::downgrade(&metadata),
                Arc::new(SystemClock),
            )
            .unwrap(),
        );
        let dispatcher = Arc::new(
            EventDispatcher::new(DispatcherSettings {
                queue_capacity,
                overflow_policy: OverflowPolicy::ExecuteInline,
            })
            .unwrap(),
        );
        assert!(dispatcher.register(writer.clone()));

        Harness {
            dir,
            builder: RecordBuilder::new(metadata.clone(), Arc::new(FixedClock::new(1_700_000_000_000))),
            _metadata: metadata,
            writer,
            dispatcher,
            _tmp: tmp,
        }
    }

    fn sample(sensor: &str, seq: u32) -> SensorSample {
        SensorSample {
            sensor_name: sensor.to_string(),
            x: seq as f32,
            y: 0.0,
            z: 9.81,
            accuracy: 3,
        }
    }

    fn read_records(path: &Path) -> Vec<Record> {
        let file = std::fs::File::open(path).unwrap();
        let reader: Box<dyn Read> = match CompressionMode::from_path(path) {
            Some(CompressionMode::Gzip) => Box::new(GzDecoder::new(file)),
            _ => Box::new(file),
        };
        BufReader::new(reader)
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect()
    }

    fn stored_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    fn settings() -> UploadSettings {
        UploadSettings {
            retry_delay_ms: 1,
            ..UploadSettings::default()
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::from_host_port("127.0.0.1", 8080).unwrap()
    }

    #[derive(Default)]
    struct CountingObserver {
        successes: AtomicUsize,
        failures: AtomicUsize,
    }

    impl BatchObserver for CountingObserver {
        fn on_success(&self, _outcome: &BatchOutcome) {
            self.successes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failure(&self, _outcome: &BatchOutcome) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Concurrent producers, a one-slot queue and small segments: every record lands exactly once
    #[test]
    fn test_dispatch_to_plain_log_loses_nothing() {
        let h = harness(CompressionMode::Plain, 4096, 1);
        let producers = 4;
        let per_producer = 250;

        thread::scope(|s| {
            for p in 0..producers {
                let builder = h.builder.clone();
                let dispatcher = h.dispatcher.clone();
                s.spawn(move || {
                    for seq in 0..per_producer {
                        dispatcher.dispatch(builder.build(sample(&format!("sensor-{p}"), seq)));
                    }
                });
            }
        });
        h.dispatcher.shutdown().unwrap();
        h.writer.shutdown().unwrap();

        let files = stored_files(&h.dir);
        assert!(files.len() > 1, "expected size rotation, got {files:?}");

        let mut seen = HashSet::new();
        for file in &files {
            for record in read_records(file) {
                assert_eq!(record.user_id, "e2e");
                assert!(seen.insert((record.sensor_name, record.values.x as u32)));
            }
        }
        assert_eq!(seen.len(), producers * per_producer as usize);
    }

    /// Gzip segments: snapshot rotates the writing stream, every archive decodes,
    /// and a successful batch empties the store
    #[tokio::test]
    async fn test_gzip_log_snapshot_and_upload() {
        let h = harness(CompressionMode::Gzip, 2048, 16);
        for seq in 0..200 {
            h.dispatcher.dispatch(h.builder.build(sample("accelerometer", seq)));
        }
        h.dispatcher.shutdown().unwrap();

        let pending = h.writer.pending_segments().unwrap();
        assert!(pending.len() >= 2);
        let total: usize = pending.iter().map(|p| read_records(p).len()).sum();
        assert_eq!(total, 200);

        let coordinator =
            UploadCoordinator::new(SimulatedTransport::new(), settings(), h.writer.clone());
        let outcome = coordinator
            .upload_batch(pending.clone(), endpoint(), Arc::new(NoopObserver))
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(outcome.success_count, pending.len());
        assert!(outcome.is_success());
        assert!(pending.iter().all(|p| !p.exists()));
        assert_eq!(h.writer.unuploaded_count(), 0);
        assert!(h.writer.last_upload_at().is_some());
    }

    /// Plain snapshot uploads a copy; the writing segment keeps growing
    #[tokio::test]
    async fn test_plain_snapshot_upload_keeps_writing_segment() {
        let h = harness(CompressionMode::Plain, 1024 * 1024, 16);
        for seq in 0..10 {
            h.dispatcher.dispatch(h.builder.build(sample("gyroscope", seq)));
        }
        h.dispatcher.shutdown().unwrap();

        let writing = h.writer.current_segment_info().unwrap().path;
        let pending = h.writer.pending_segments().unwrap();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0], writing);
        assert_eq!(read_records(&pending[0]).len(), 10);

        let coordinator =
            UploadCoordinator::new(SimulatedTransport::new(), settings(), h.writer.clone());
        let outcome = coordinator
            .upload_batch(pending.clone(), endpoint(), Arc::new(NoopObserver))
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 1);
        assert!(!pending[0].exists());
        assert!(writing.exists());
        assert_eq!(h.writer.current_segment_info().unwrap().path, writing);
    }

    /// A partial-receipt rejection keeps the offset; the next batch resumes from it
    #[tokio::test]
    async fn test_resume_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2e_sensor_data_20240101_000000_000.jsonl");
        std::fs::write(&path, [b'x'; 20]).unwrap();

        let coordinator = UploadCoordinator::new(
            SimulatedTransport::with_script([
                SimulatedStep::FailAfter(6),
                SimulatedStep::Reject(500),
                SimulatedStep::Reject(500),
                SimulatedStep::Reject(500),
            ]),
            settings(),
            Arc::new(DeleteOnRelease),
        );

        let first = coordinator
            .upload_batch(vec![path.clone()], endpoint(), Arc::new(NoopObserver))
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(first.fail_count, 1);
        assert_eq!(coordinator.uploaded_bytes(&path), 6);
        assert!(path.exists());

        let second = coordinator
            .upload_batch(vec![path.clone()], endpoint(), Arc::new(NoopObserver))
            .unwrap()
            .join()
            .await
            .unwrap();
        assert_eq!(second.success_count, 1);

        let attempts = coordinator.transport().attempts();
        assert_eq!(attempts.last().map(|a| a.offset), Some(6));
        assert_eq!(attempts.iter().map(|a| a.delivered).sum::<u64>(), 20);
        assert_eq!(coordinator.uploaded_bytes(&path), 0);
        assert!(!path.exists());
    }

    /// Sizes 10 / 0 / 20: two uploads, one validation failure, one failure callback
    #[tokio::test]
    async fn test_mixed_batch_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = [10usize, 0, 20]
            .iter()
            .enumerate()
            .map(|(i, size)| {
                let path = dir.path().join(format!("e2e_sensor_data_2024010{i}_000000_000.jsonl"));
                std::fs::write(&path, vec![b'x'; *size]).unwrap();
                path
            })
            .collect();

        let coordinator =
            UploadCoordinator::new(SimulatedTransport::new(), settings(), Arc::new(DeleteOnRelease));
        let observer = Arc::new(CountingObserver::default());
        let outcome = coordinator
            .upload_batch(paths, endpoint(), observer.clone())
            .unwrap()
            .join()
            .await
            .unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.fail_count, 1);
        assert_eq!(observer.successes.load(Ordering::SeqCst), 0);
        assert_eq!(observer.failures.load(Ordering::SeqCst), 1);
    }

    /// Critical pressure reaches all three components
    #[tokio::test]
    async fn test_critical_pressure_fans_out() {
        let h = harness(CompressionMode::Plain, 1024 * 1024, 16);
        h.dispatcher.dispatch(h.builder.build(sample("accelerometer", 1)));
        h.dispatcher.shutdown().unwrap();

        let before = h.writer.current_segment_info().unwrap().path;
        let upload = h.dir.join("e2e_sensor_data_19700101_000000_000.jsonl");
        std::fs::write(&upload, [b'x'; 16]).unwrap();

        let coordinator = UploadCoordinator::new(
            SimulatedTransport::with_script([SimulatedStep::Hang]),
            settings(),
            Arc::new(DeleteOnRelease),
        );
        let observer = Arc::new(CountingObserver::default());
        let handle = coordinator
            .upload_batch(vec![upload.clone()], endpoint(), observer.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let components: [&dyn PressureAware; 3] = [&*h.dispatcher, &*h.writer, &coordinator];
        for component in components {
            component.on_resource_pressure(PressureLevel::Critical);
        }

        let outcome = handle.join().await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(observer.failures.load(Ordering::SeqCst), 1);
        assert!(upload.exists());
        assert!(!h.dispatcher.is_collecting());
        assert_ne!(h.writer.current_segment_info().unwrap().path, before);
    }
}
