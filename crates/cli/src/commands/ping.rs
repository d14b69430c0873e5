//! `ping` command implementation.

use anyhow::{Context, Result};
use tracing::info;
use uploader::{Endpoint, TransportError, UploadTransport};

use crate::cli::PingArgs;
use crate::error::CliError;

/// Execute the `ping` command
pub async fn run_ping(args: &PingArgs) -> Result<()> {
    let config = super::load_config(&args.config).context("Failed to load configuration")?;

    let endpoint = match (&args.host, args.port) {
        (Some(host), Some(port)) => Endpoint::from_host_port(host, port),
        _ => {
            let url = config.upload.base_url.as_deref().ok_or(CliError::NoEndpoint)?;
            Endpoint::parse(url)
        }
    }
    .map_err(CliError::from)?;

    info!(endpoint = %endpoint, "Pinging collector");
    let transport = uploader::HttpTransport::new(&config.upload).map_err(CliError::from)?;
    match transport.ping(&endpoint).await {
        Ok(body) => {
            println!("✓ {} is reachable: {}", endpoint, body.trim());
            Ok(())
        }
        Err(e @ TransportError::Rejected { .. }) => {
            println!("✗ {} answered with an error: {}", endpoint, e);
            anyhow::bail!("Collector rejected the probe")
        }
        Err(e) => {
            println!("✗ {} is unreachable: {}", endpoint, e);
            anyhow::bail!("Collector unreachable")
        }
    }
}
