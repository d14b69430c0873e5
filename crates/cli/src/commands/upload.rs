//! `upload` command implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::{Clock, MetadataProvider, RecordingFlag, StaticMetadata, SystemClock};
use observability::UploadStatsAggregator;
use segment_log::LogWriter;
use serde::Serialize;
use tracing::info;
use uploader::Endpoint;

use crate::cli::UploadArgs;
use crate::error::CliError;
use crate::pipeline::SegmentUploader;

/// Batch outcome for JSON output
#[derive(Serialize)]
struct UploadReport {
    endpoint: String,
    success_count: usize,
    fail_count: usize,
    cancelled: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    error_summary: String,
}

/// Execute the `upload` command
pub async fn run_upload(args: &UploadArgs) -> Result<()> {
    let config = super::load_config(&args.config).context("Failed to load configuration")?;
    let url = config.upload.base_url.as_deref().ok_or(CliError::NoEndpoint)?;
    let endpoint = Endpoint::parse(url).map_err(CliError::from)?;

    let metadata: Arc<dyn MetadataProvider> =
        Arc::new(StaticMetadata::new(&config.identity.user_id));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let writer = Arc::new(
        LogWriter::open(
            config.storage.clone(),
            RecordingFlag::new(true),
            Arc::downgrade(&metadata),
            clock,
        )
        .map_err(CliError::from)
        .context("Failed to open segment log")?,
    );

    // Seal whatever recovery resumed so everything stored is sent
    writer.force_rotate().map_err(CliError::from)?;
    info!(
        segments = writer.unuploaded_count(),
        bytes = writer.unuploaded_total_bytes(),
        endpoint = %endpoint,
        "Uploading stored segments"
    );

    let uploader = SegmentUploader::new(&config.upload, endpoint, writer.clone())?;
    let mut stats = UploadStatsAggregator::new();
    let outcome = uploader.upload_pending(&mut stats).await?;
    writer.shutdown().map_err(CliError::from)?;

    let Some(outcome) = outcome else {
        println!("Nothing to upload");
        return Ok(());
    };

    if args.json {
        let report = UploadReport {
            endpoint: uploader.endpoint().to_string(),
            success_count: outcome.success_count,
            fail_count: outcome.fail_count,
            cancelled: outcome.cancelled,
            error_summary: outcome.error_summary.clone(),
        };
        let json =
            serde_json::to_string_pretty(&report).context("Failed to serialize upload report")?;
        println!("{}", json);
    } else {
        println!("{}", stats.summary());
        if !outcome.error_summary.is_empty() {
            println!("Errors: {}", outcome.error_summary);
        }
    }

    if outcome.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{} segment(s) failed to upload", outcome.fail_count)
    }
}
