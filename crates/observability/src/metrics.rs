//! 管道指标收集模块
//!
//! Dispatcher / segment log / uploader 三个组件的 Prometheus 指标，
//! 以及供 CLI 输出摘要的内存聚合器。

use metrics::{counter, gauge, histogram};

/// 上传结果标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcomeLabel {
    Success,
    Failure,
    Cancelled,
}

impl UploadOutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadOutcomeLabel::Success => "success",
            UploadOutcomeLabel::Failure => "failure",
            UploadOutcomeLabel::Cancelled => "cancelled",
        }
    }
}

/// 记录一次分发
///
/// `inline` 表示队列已满，投递在调用线程上执行。
pub fn record_record_dispatched(inline: bool) {
    counter!("telemetry_records_dispatched_total").increment(1);
    if inline {
        counter!("telemetry_dispatch_inline_total").increment(1);
    }
}

/// 记录消费者失败
pub fn record_consumer_failure(consumer: &str) {
    counter!(
        "telemetry_consumer_failures_total",
        "consumer" => consumer.to_string()
    )
    .increment(1);
}

/// 记录当前活动段大小
pub fn record_segment_bytes(bytes: u64) {
    gauge!("telemetry_segment_bytes").set(bytes as f64);
}

/// 记录段封存
pub fn record_segment_sealed(bytes: u64) {
    counter!("telemetry_segments_sealed_total").increment(1);
    histogram!("telemetry_sealed_segment_bytes").record(bytes as f64);
}

/// 记录单个段的上传结果
pub fn record_upload(outcome: UploadOutcomeLabel, bytes: u64) {
    counter!(
        "telemetry_uploads_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    if outcome == UploadOutcomeLabel::Success {
        counter!("telemetry_uploaded_bytes_total").increment(bytes);
    }
}

/// 记录上传重试
pub fn record_upload_retry(attempt: u32) {
    counter!("telemetry_upload_retries_total").increment(1);
    gauge!("telemetry_upload_last_attempt").set(attempt as f64);
}

/// 记录批次整体进度 (0-100)
pub fn record_upload_progress(percent: u8) {
    gauge!("telemetry_upload_progress").set(percent as f64);
}

/// 上传统计聚合器
///
/// 在内存中聚合批次结果，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct UploadStatsAggregator {
    /// 批次数
    pub batches: u64,

    /// 成功段数
    pub segments_ok: u64,

    /// 失败段数
    pub segments_failed: u64,

    /// 被取消的批次数
    pub cancelled: u64,

    /// 段大小统计 (字节)
    pub segment_bytes: RunningStats,
}

impl UploadStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新批次统计
    pub fn update_batch(&mut self, success_count: u64, fail_count: u64, cancelled: bool) {
        self.batches += 1;
        self.segments_ok += success_count;
        self.segments_failed += fail_count;
        if cancelled {
            self.cancelled += 1;
        }
    }

    /// 更新段大小统计
    pub fn push_segment(&mut self, bytes: u64) {
        self.segment_bytes.push(bytes as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> UploadSummary {
        let total = self.segments_ok + self.segments_failed;
        UploadSummary {
            batches: self.batches,
            segments_ok: self.segments_ok,
            segments_failed: self.segments_failed,
            cancelled: self.cancelled,
            success_rate: if total > 0 {
                self.segments_ok as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            segment_bytes: StatsSummary::from(&self.segment_bytes),
        }
    }
}

/// 上传摘要
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub batches: u64,
    pub segments_ok: u64,
    pub segments_failed: u64,
    pub cancelled: u64,
    pub success_rate: f64,
    pub segment_bytes: StatsSummary,
}

impl std::fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Upload Summary ===")?;
        writeln!(f, "Batches: {}", self.batches)?;
        writeln!(
            f,
            "Segments uploaded: {} ({:.2}%)",
            self.segments_ok, self.success_rate
        )?;
        writeln!(f, "Segments failed: {}", self.segments_failed)?;
        writeln!(f, "Cancelled batches: {}", self.cancelled)?;
        writeln!(f, "Segment size (bytes): {}", self.segment_bytes)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1} (n={})",
                self.min, self.max, self.mean, self.count
            )
        }
    }
}

/// 在线统计计算器
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            self.mean += (value - self.mean) / self.count as f64;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [10.0, 20.0, 30.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 3);
        assert!((stats.mean() - 20.0).abs() < 1e-10);
        assert!((stats.min() - 10.0).abs() < 1e-10);
        assert!((stats.max() - 30.0).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = UploadStatsAggregator::new();
        aggregator.update_batch(2, 1, false);
        aggregator.update_batch(0, 1, true);
        aggregator.push_segment(10);

        let summary = aggregator.summary();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.segments_ok, 2);
        assert_eq!(summary.segments_failed, 2);
        assert_eq!(summary.cancelled, 1);
        assert!((summary.success_rate - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = UploadStatsAggregator::new();
        aggregator.update_batch(3, 1, false);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Segments uploaded: 3"));
        assert!(output.contains("75.00%"));
        assert!(output.contains("N/A"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_record_dispatched(true);
        record_segment_sealed(128);
        record_upload(UploadOutcomeLabel::Success, 128);
        record_upload_progress(100);
    }
}
