//! # Config Loader
//!
//! Reads the `telemetry.toml` (or `.json`) file that drives the pipeline and
//! checks it before any component is built. Sections:
//!
//! - `[storage]`: segment directory, compression, rotation thresholds
//! - `[dispatcher]`: delivery queue capacity and overflow policy
//! - `[upload]`: collector URL, retry budget, timeouts, partial-receipt statuses
//! - `[identity]`: user id used in segment names and records
//!
//! Command-line overrides are applied by the caller, which then re-runs
//! [`ConfigLoader::validate`].

mod parser;
mod validator;

pub use contracts::PipelineConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Entry points for loading and checking `PipelineConfig`
pub struct ConfigLoader;

impl ConfigLoader {
    /// Read, decode and validate a configuration file, format chosen by extension
    pub fn load_from_path(path: &Path) -> Result<PipelineConfig, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<PipelineConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }

    /// Returns the first violated rule
    pub fn validate(config: &PipelineConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &PipelineConfig) -> Result<String, ContractError> {
        parser::render(config, ConfigFormat::Toml)
    }

    pub fn to_json(config: &PipelineConfig) -> Result<String, ContractError> {
        parser::render(config, ConfigFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CompressionMode;

    const RIDER_TOML: &str = r#"
[storage]
dir = "./segments"
compression = "plain"
max_segment_bytes = 4096
rotation_interval_secs = 600

[upload]
base_url = "http://127.0.0.1:8080"
max_retries = 5

[identity]
user_id = "rider-7"
"#;

    #[test]
    fn test_load_from_path_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        std::fs::write(&path, RIDER_TOML).unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(config.storage.compression, CompressionMode::Plain);
        assert_eq!(config.storage.max_segment_bytes, 4096);
        assert_eq!(config.upload.max_retries, 5);
        assert_eq!(config.identity.user_id, "rider-7");
    }

    #[test]
    fn test_load_from_path_reads_json_written_by_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::load_from_str(RIDER_TOML, ConfigFormat::Toml).unwrap();
        let path = dir.path().join("telemetry.json");
        std::fs::write(&path, ConfigLoader::to_json(&config).unwrap()).unwrap();

        let again = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(again.storage.dir, config.storage.dir);
        assert_eq!(again.upload.base_url, config.upload.base_url);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("telemetry.yaml");
        std::fs::write(&yaml, "storage: {}").unwrap();

        let err = ConfigLoader::load_from_path(&yaml).unwrap_err().to_string();
        assert!(err.contains("unsupported config format"), "got: {err}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_from_path(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ContractError::Io(_))));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let result = ConfigLoader::load_from_str("[dispatcher]\nqueue_capacity = 0\n", ConfigFormat::Toml);
        assert!(result.unwrap_err().to_string().contains("queue_capacity"));
    }
}
