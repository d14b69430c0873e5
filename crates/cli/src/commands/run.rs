//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, RunOptions};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let config = super::load_config(&args.config).context("Failed to load configuration")?;

    info!(
        dir = %config.storage.dir.display(),
        compression = ?config.storage.compression,
        max_segment_bytes = config.storage.max_segment_bytes,
        user_id = %config.identity.user_id,
        upload_url = ?config.upload.base_url,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let options = RunOptions {
        input: args.input.clone(),
        upload_interval: (args.upload_interval > 0)
            .then(|| Duration::from_secs(args.upload_interval)),
        final_upload: !args.no_final_upload,
        max_records: (args.max_records > 0).then_some(args.max_records),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(config, options)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        records = stats.records_dispatched,
        duration_secs = stats.duration.as_secs_f64(),
        rps = format!("{:.2}", stats.rps()),
        "Pipeline completed successfully"
    );
    stats.print_summary();
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::PipelineConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Storage:");
    println!("  Dir: {}", config.storage.dir.display());
    println!("  Compression: {:?}", config.storage.compression);
    println!("  Max segment bytes: {}", config.storage.max_segment_bytes);
    println!("  Rotation interval: {}s", config.storage.rotation_interval_secs);

    println!("\nDispatcher:");
    println!("  Queue capacity: {}", config.dispatcher.queue_capacity);
    println!("  Overflow policy: {:?}", config.dispatcher.overflow_policy);

    println!("\nUpload:");
    match &config.upload.base_url {
        Some(url) => println!("  Collector: {url}"),
        None => println!("  Collector: (disabled)"),
    }
    println!(
        "  Retries: {} (base delay {}ms)",
        config.upload.max_retries, config.upload.retry_delay_ms
    );

    println!("\nIdentity:");
    println!("  User: {}", config.identity.user_id);
    println!();
}
