//! Adapter configuration.
//!
//! Loaded from an optional YAML file; every knob has a serde default so
//! a missing file or partial config yields a runnable server. A handful
//! of values can be overridden by `LLM_ADAPTER_*` environment variables
//! (see `main.rs` flags).

use std::path::{Path, PathBuf};

use adapter_auth::AuthConfig;
use serde::{Deserialize, Serialize};

/// Transport and admission knobs for the serving layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_bytes: usize,
    pub body_read_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub stream_idle_timeout_ms: u64,
    pub max_concurrent_requests: usize,
    pub max_concurrent_streams: usize,
    pub max_queue_size: usize,
    pub queue_timeout_ms: u64,
    pub security_headers: bool,
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_request_bytes: 10 * 1024 * 1024,
            body_read_timeout_ms: 10_000,
            request_timeout_ms: 120_000,
            stream_idle_timeout_ms: 60_000,
            max_concurrent_requests: 8,
            max_concurrent_streams: 8,
            max_queue_size: 16,
            queue_timeout_ms: 30_000,
            security_headers: true,
            trust_proxy_headers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allowed_methods: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_headers: vec![
                "content-type".to_string(),
                "authorization".to_string(),
                "x-api-key".to_string(),
            ],
            allowed_methods: vec!["POST".to_string(), "OPTIONS".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Bucket refill rate.
    pub requests_per_minute: u32,
    /// Bucket capacity.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Base directory for file logs.
    pub dir: PathBuf,
    pub llm_log_max_files: usize,
    pub batch_log_max_files: usize,
    /// Age cap for timestamped log files, in hours. 0 disables.
    pub max_age_hours: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            llm_log_max_files: 50,
            batch_log_max_files: 200,
            max_age_hours: 0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdapterConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub plugins_dir: PathBuf,
}

impl AdapterConfig {
    /// Load from a YAML file; `None` yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Cannot parse config file {0}: {1}")]
    Parse(PathBuf, serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AdapterConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.max_concurrent_requests, 8);
        assert!(cfg.server.security_headers);
        assert!(!cfg.rate_limit.enabled);
        assert_eq!(cfg.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
server:
  port: 9999
  maxQueueSize: 0
rateLimit:
  enabled: true
  burst: 3
pluginsDir: /opt/plugins
"#;
        let cfg: AdapterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.max_queue_size, 0);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert!(cfg.rate_limit.enabled);
        assert_eq!(cfg.rate_limit.burst, 3);
        assert_eq!(cfg.rate_limit.requests_per_minute, 60);
        assert_eq!(cfg.plugins_dir, PathBuf::from("/opt/plugins"));
    }

    #[test]
    fn test_load_missing_path_is_defaults() {
        let cfg = AdapterConfig::load(None).unwrap();
        assert_eq!(cfg.server.port, 8080);
    }
}
