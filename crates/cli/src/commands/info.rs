//! `info` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::{is_segment_file_name, is_upload_copy_name, CompressionMode, PipelineConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    storage: StorageInfo,
    dispatcher: DispatcherInfo,
    upload: UploadInfo,
    user_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    segments: Vec<SegmentEntry>,
}

#[derive(Serialize)]
struct StorageInfo {
    dir: String,
    compression: String,
    max_segment_bytes: u64,
    rotation_interval_secs: u64,
    stored_segments: usize,
    stored_bytes: u64,
}

#[derive(Serialize)]
struct DispatcherInfo {
    queue_capacity: usize,
    overflow_policy: String,
}

#[derive(Serialize)]
struct UploadInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    max_retries: u32,
    retry_delay_ms: u64,
}

#[derive(Serialize)]
struct SegmentEntry {
    name: String,
    mode: String,
    size_bytes: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let config = super::load_config(&args.config).context("Failed to load configuration")?;
    info!(dir = %config.storage.dir.display(), "Loading configuration info");

    let segments = stored_segments(&config.storage.dir)
        .with_context(|| format!("Failed to list {}", config.storage.dir.display()))?;
    let info = build_config_info(&config, segments);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info, args);
    }

    Ok(())
}

/// Segment files on disk, oldest name first. Read-only: nothing is recovered or sealed.
fn stored_segments(dir: &Path) -> std::io::Result<Vec<SegmentEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_segment_file_name(&name) || is_upload_copy_name(&name) {
            continue;
        }
        let path = entry.path();
        let Some(mode) = CompressionMode::from_path(&path) else {
            continue;
        };
        segments.push(SegmentEntry {
            name,
            mode: format!("{:?}", mode),
            size_bytes: entry.metadata()?.len(),
        });
    }
    segments.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(segments)
}

fn build_config_info(config: &PipelineConfig, segments: Vec<SegmentEntry>) -> ConfigInfo {
    ConfigInfo {
        storage: StorageInfo {
            dir: config.storage.dir.display().to_string(),
            compression: format!("{:?}", config.storage.compression),
            max_segment_bytes: config.storage.max_segment_bytes,
            rotation_interval_secs: config.storage.rotation_interval_secs,
            stored_segments: segments.len(),
            stored_bytes: segments.iter().map(|s| s.size_bytes).sum(),
        },
        dispatcher: DispatcherInfo {
            queue_capacity: config.dispatcher.queue_capacity,
            overflow_policy: format!("{:?}", config.dispatcher.overflow_policy),
        },
        upload: UploadInfo {
            base_url: config.upload.base_url.clone(),
            max_retries: config.upload.max_retries,
            retry_delay_ms: config.upload.retry_delay_ms,
        },
        user_id: config.identity.user_id.clone(),
        segments,
    }
}

fn print_config_info(info: &ConfigInfo, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Telemetry Buffer Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("💾 Storage");
    println!("   ├─ Dir: {}", info.storage.dir);
    println!("   ├─ Compression: {}", info.storage.compression);
    println!("   ├─ Max segment bytes: {}", info.storage.max_segment_bytes);
    println!("   ├─ Rotation interval: {}s", info.storage.rotation_interval_secs);
    println!(
        "   └─ Stored: {} segments, {} bytes",
        info.storage.stored_segments, info.storage.stored_bytes
    );

    if args.segments && !info.segments.is_empty() {
        println!("\n📂 Segments ({})", info.segments.len());
        for (i, segment) in info.segments.iter().enumerate() {
            let prefix = if i == info.segments.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, {} bytes)",
                prefix, segment.name, segment.mode, segment.size_bytes
            );
        }
    }

    println!("\n📨 Dispatcher");
    println!("   ├─ Queue capacity: {}", info.dispatcher.queue_capacity);
    println!("   └─ Overflow policy: {}", info.dispatcher.overflow_policy);

    println!("\n📤 Upload");
    match &info.upload.base_url {
        Some(url) => println!("   ├─ Collector: {}", url),
        None => println!("   ├─ Collector: (disabled)"),
    }
    println!(
        "   └─ Retries: {} (base delay {}ms)",
        info.upload.max_retries, info.upload.retry_delay_ms
    );

    println!("\n👤 User: {}", info.user_id);
    println!();
}
