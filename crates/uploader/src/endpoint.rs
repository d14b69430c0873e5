//! Endpoint - validated collector base URL

use std::fmt;
use std::net::Ipv4Addr;

use reqwest::Url;

use crate::error::UploadError;

/// Base URL of the collector, e.g. `http://10.0.0.2:8080`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    /// Build `http://host:port` from a host (IPv4 or `localhost`) and a port
    pub fn from_host_port(host: &str, port: u32) -> Result<Self, UploadError> {
        let host = host.trim();
        let input = format!("{host}:{port}");

        if host != "localhost" && host.parse::<Ipv4Addr>().is_err() {
            return Err(UploadError::invalid_endpoint(
                input,
                "host must be an IPv4 address or localhost",
            ));
        }
        if !(1..=65535).contains(&port) {
            return Err(UploadError::invalid_endpoint(
                input,
                "port must be between 1 and 65535",
            ));
        }

        Ok(Self {
            base: format!("http://{host}:{port}"),
        })
    }

    /// Accept any http(s) URL with a host
    pub fn parse(url: &str) -> Result<Self, UploadError> {
        let parsed =
            Url::parse(url.trim()).map_err(|e| UploadError::invalid_endpoint(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UploadError::invalid_endpoint(url, "scheme must be http or https"));
        }
        if parsed.host_str().is_none() {
            return Err(UploadError::invalid_endpoint(url, "missing host"));
        }

        Ok(Self {
            base: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.base)
    }

    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.base)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// Whether a host/port pair would produce a valid endpoint
pub fn is_valid_server_info(host: &str, port: u32) -> bool {
    Endpoint::from_host_port(host, port).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_host_port() {
        let endpoint = Endpoint::from_host_port("192.168.1.20", 8080).unwrap();
        assert_eq!(endpoint.base(), "http://192.168.1.20:8080");
        assert_eq!(endpoint.upload_url(), "http://192.168.1.20:8080/upload");
        assert_eq!(endpoint.ping_url(), "http://192.168.1.20:8080/ping");

        assert!(is_valid_server_info("localhost", 1));
        assert!(is_valid_server_info("10.0.0.1", 65535));
    }

    #[test]
    fn test_from_host_port_rejects_bad_input() {
        assert!(!is_valid_server_info("example.com", 80));
        assert!(!is_valid_server_info("256.1.1.1", 80));
        assert!(!is_valid_server_info("10.0.0.1", 0));
        assert!(!is_valid_server_info("10.0.0.1", 65536));
        assert!(!is_valid_server_info("", 80));
    }

    #[test]
    fn test_parse_url() {
        let endpoint = Endpoint::parse("https://collector.example.com:9443/").unwrap();
        assert_eq!(endpoint.upload_url(), "https://collector.example.com:9443/upload");

        assert!(Endpoint::parse("ftp://host/").is_err());
        assert!(Endpoint::parse("not a url").is_err());
    }
}
