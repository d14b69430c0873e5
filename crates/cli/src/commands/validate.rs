//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CompressionMode, PipelineConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Segments smaller than this rotate very often
const SMALL_SEGMENT_BYTES: u64 = 64 * 1024;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    dir: String,
    compression: String,
    max_segment_bytes: u64,
    rotation_interval_secs: u64,
    queue_capacity: usize,
    upload_enabled: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    dir: config.storage.dir.display().to_string(),
                    compression: format!("{:?}", config.storage.compression),
                    max_segment_bytes: config.storage.max_segment_bytes,
                    rotation_interval_secs: config.storage.rotation_interval_secs,
                    queue_capacity: config.dispatcher.queue_capacity,
                    upload_enabled: config.upload.base_url.is_some(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &PipelineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.upload.base_url.is_none() {
        warnings.push("upload.base_url is not set - segments will only be stored locally".to_string());
    }

    if config.storage.max_segment_bytes < SMALL_SEGMENT_BYTES {
        warnings.push(format!(
            "storage.max_segment_bytes is {} - segments will rotate very often",
            config.storage.max_segment_bytes
        ));
    }

    if config.storage.compression == CompressionMode::Plain
        && config.storage.min_forced_rotation_interval_secs > 0
    {
        warnings.push(
            "storage.min_forced_rotation_interval_secs only applies to gzip segments".to_string(),
        );
    }

    if config.upload.max_retries == 0 {
        warnings.push("upload.max_retries is 0 - failed attempts are never retried".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Dir: {}", summary.dir);
            println!("  Compression: {}", summary.compression);
            println!("  Max segment bytes: {}", summary.max_segment_bytes);
            println!("  Rotation interval: {}s", summary.rotation_interval_secs);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Upload enabled: {}", summary.upload_enabled);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_file_is_invalid() {
        let result = validate_config(&ValidateArgs {
            config: PathBuf::from("/nonexistent/telemetry.toml"),
            json: false,
        });
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_valid_file_with_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        std::fs::write(
            &path,
            "[storage]\ndir = \"segments\"\ncompression = \"plain\"\nmax_segment_bytes = 1024\nmin_forced_rotation_interval_secs = 5\n",
        )
        .unwrap();

        let result = validate_config(&ValidateArgs {
            config: path,
            json: true,
        });
        assert!(result.valid);
        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(!result.summary.unwrap().upload_enabled);
    }
}
