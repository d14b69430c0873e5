//! Decoding and encoding of `PipelineConfig`
//!
//! TOML is the primary format; JSON is accepted for files produced by tooling.

use std::path::Path;

use contracts::{ContractError, PipelineConfig};

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Case-insensitive extension lookup
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "{}: cannot determine file format from extension",
                path.display()
            ))
        })?;
        Self::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    fn label(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

/// Decode a configuration; absent sections and fields take their defaults
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineConfig, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| decode_error(format, e)),
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| decode_error(format, e)),
    }
}

/// Encode a configuration, e.g. to print the effective settings
pub fn render(config: &PipelineConfig, format: ConfigFormat) -> Result<String, ContractError> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
    };
    rendered.map_err(|e| {
        ContractError::config_parse(format!("{} serialize error: {e}", format.label()))
    })
}

fn decode_error<E>(format: ConfigFormat, e: E) -> ContractError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ContractError::ConfigParse {
        message: format!("{} parse error: {e}", format.label()),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CompressionMode, OverflowPolicy};

    #[test]
    fn test_toml_sections_fall_back_to_defaults() {
        let content = r#"
[storage]
dir = "/var/lib/telemetry"
compression = "plain"
max_segment_bytes = 1048576

[dispatcher]
overflow_policy = "block_caller"
"#;
        let config = parse(content, ConfigFormat::Toml).unwrap();
        assert_eq!(config.storage.compression, CompressionMode::Plain);
        assert_eq!(config.storage.max_segment_bytes, 1048576);
        assert_eq!(config.dispatcher.overflow_policy, OverflowPolicy::BlockCaller);
        assert_eq!(config.dispatcher.queue_capacity, 50);
        assert_eq!(config.upload.max_retries, 3);
        assert_eq!(config.upload.partial_receipt_statuses, vec![404, 500]);
    }

    #[test]
    fn test_json_upload_section() {
        let content = r#"{
            "storage": { "dir": "segments", "compression": "gzip" },
            "upload": { "base_url": "http://10.0.0.2:8080", "retry_delay_ms": 500 },
            "identity": { "user_id": "alice" }
        }"#;
        let config = parse(content, ConfigFormat::Json).unwrap();
        assert_eq!(config.upload.base_url.as_deref(), Some("http://10.0.0.2:8080"));
        assert_eq!(config.upload.retry_delay_ms, 500);
        assert_eq!(config.identity.user_id, "alice");
    }

    #[test]
    fn test_syntax_error_names_format() {
        let err = parse("invalid toml [[[", ConfigFormat::Toml).unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_unknown_overflow_policy_rejected() {
        let content = r#"
[dispatcher]
overflow_policy = "drop_newest"
"#;
        assert!(matches!(
            parse(content, ConfigFormat::Toml),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("telemetry.TOML")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("/etc/telemetry.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("telemetry.yaml")).is_err());
        assert!(ConfigFormat::from_path(Path::new("telemetry")).is_err());
    }

    #[test]
    fn test_render_parses_back() {
        let config = parse("[identity]\nuser_id = \"rider-7\"\n", ConfigFormat::Toml).unwrap();
        for format in [ConfigFormat::Toml, ConfigFormat::Json] {
            let text = render(&config, format).unwrap();
            assert_eq!(parse(&text, format).unwrap().identity.user_id, "rider-7");
        }
    }
}
