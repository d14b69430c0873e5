//! Pipeline orchestration module.

mod feed;
mod orchestrator;
mod stats;
mod upload;

pub use orchestrator::{Pipeline, RunOptions};
pub use stats::PipelineStats;
pub use upload::{PendingBatch, SegmentUploader};
