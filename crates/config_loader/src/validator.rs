//! 配置校验模块
//!
//! 校验规则：
//! - storage.dir 非空
//! - max_segment_bytes > 0
//! - rotation_interval_secs >= 1
//! - queue_capacity >= 1
//! - retry_delay_ms <= 10 分钟
//! - base_url 必须是 http(s) URL
//! - user_id 非空

use contracts::{ContractError, PipelineConfig};

/// 重试基础延迟上限 (毫秒)
const MAX_RETRY_DELAY_MS: u64 = 10 * 60 * 1000;

/// 校验 PipelineConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &PipelineConfig) -> Result<(), ContractError> {
    validate_storage(config)?;
    validate_dispatcher(config)?;
    validate_upload(config)?;
    validate_identity(config)?;
    Ok(())
}

/// 校验存储配置
fn validate_storage(config: &PipelineConfig) -> Result<(), ContractError> {
    let storage = &config.storage;

    if storage.dir.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "storage.dir",
            "storage dir cannot be empty",
        ));
    }
    if storage.max_segment_bytes == 0 {
        return Err(ContractError::config_validation(
            "storage.max_segment_bytes",
            "max_segment_bytes must be > 0",
        ));
    }
    if storage.rotation_interval_secs == 0 {
        return Err(ContractError::config_validation(
            "storage.rotation_interval_secs",
            "rotation_interval_secs must be >= 1",
        ));
    }
    Ok(())
}

/// 校验分发器配置
fn validate_dispatcher(config: &PipelineConfig) -> Result<(), ContractError> {
    if config.dispatcher.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.queue_capacity",
            "queue_capacity must be >= 1",
        ));
    }
    Ok(())
}

/// 校验上传配置
fn validate_upload(config: &PipelineConfig) -> Result<(), ContractError> {
    let upload = &config.upload;

    if upload.retry_delay_ms > MAX_RETRY_DELAY_MS {
        return Err(ContractError::config_validation(
            "upload.retry_delay_ms",
            format!(
                "retry_delay_ms must be <= {MAX_RETRY_DELAY_MS}, got {}",
                upload.retry_delay_ms
            ),
        ));
    }
    if upload.connect_timeout_secs == 0 || upload.request_timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "upload.connect_timeout_secs / upload.request_timeout_secs",
            "timeouts must be >= 1 second",
        ));
    }
    if let Some(url) = &upload.base_url {
        if !is_http_url(url) {
            return Err(ContractError::config_validation(
                "upload.base_url",
                format!("'{url}' is not an http(s) URL"),
            ));
        }
    }
    Ok(())
}

/// 校验身份配置
fn validate_identity(config: &PipelineConfig) -> Result<(), ContractError> {
    if config.identity.user_id.trim().is_empty() {
        return Err(ContractError::config_validation(
            "identity.user_id",
            "user_id cannot be empty",
        ));
    }
    Ok(())
}

/// `http://host[:port][/path]` 或 `https://...`
fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    match rest {
        Some(rest) => {
            let authority = rest.split('/').next().unwrap_or_default();
            let host = authority.rsplit_once(':').map_or(authority, |(h, _)| h);
            !host.is_empty() && !authority.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_config() {
        let mut config = PipelineConfig::default();
        config.upload.base_url = Some("http://10.0.0.2:8080".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_dir() {
        let mut config = PipelineConfig::default();
        config.storage.dir = PathBuf::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("storage dir cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_zero_segment_size() {
        let mut config = PipelineConfig::default();
        config.storage.max_segment_bytes = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("max_segment_bytes must be > 0"), "got: {err}");
    }

    #[test]
    fn test_zero_rotation_interval() {
        let mut config = PipelineConfig::default();
        config.storage.rotation_interval_secs = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("rotation_interval_secs"), "got: {err}");
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut config = PipelineConfig::default();
        config.dispatcher.queue_capacity = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("queue_capacity must be >= 1"), "got: {err}");
    }

    #[test]
    fn test_retry_delay_too_long() {
        let mut config = PipelineConfig::default();
        config.upload.retry_delay_ms = MAX_RETRY_DELAY_MS + 1;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("retry_delay_ms"), "got: {err}");
    }

    #[test]
    fn test_bad_base_url() {
        let mut config = PipelineConfig::default();
        for url in ["ftp://host", "10.0.0.2:8080", "http://", "http://:8080"] {
            config.upload.base_url = Some(url.into());
            let err = validate(&config).unwrap_err().to_string();
            assert!(err.contains("not an http(s) URL"), "{url}: {err}");
        }
    }

    #[test]
    fn test_empty_user_id() {
        let mut config = PipelineConfig::default();
        config.identity.user_id = "  ".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("user_id cannot be empty"), "got: {err}");
    }

    #[test]
    fn test_http_url_forms() {
        assert!(is_http_url("http://localhost:8080"));
        assert!(is_http_url("https://collector.example.com/api"));
        assert!(!is_http_url("localhost:8080"));
    }
}
