use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::GatewayError;

/// Immutable, fully-resolved configuration tree. Built once at startup and
/// threaded through every component by reference — no part of the server
/// reaches for a global config singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub http: SurfaceConfig,
    #[serde(default = "default_rpc_surface")]
    pub rpc: SurfaceConfig,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub caps: SubscriptionCaps,
    #[serde(default)]
    pub trading: TradingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionCaps {
    #[serde(default = "default_max_subs")]
    pub max_subs: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default)]
    pub firehose_enabled: bool,
}

impl SubscriptionCaps {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default)]
    pub allow_real_trading: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default = "default_header_name")]
    pub header_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_origins")]
    pub allow_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_app_name() -> String {
    "market-gateway".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_subs() -> usize {
    100
}
fn default_queue_depth() -> usize {
    1000
}
fn default_heartbeat_timeout_secs() -> u64 {
    60
}
fn default_header_name() -> String {
    "Authorization".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_max_workers() -> usize {
    8
}
fn default_rpc_surface() -> SurfaceConfig {
    SurfaceConfig {
        host: default_host(),
        port: 8081,
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            debug: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            caps: SubscriptionCaps::default(),
            trading: TradingConfig::default(),
        }
    }
}

impl Default for SubscriptionCaps {
    fn default() -> Self {
        Self {
            max_subs: default_max_subs(),
            queue_depth: default_queue_depth(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            firehose_enabled: false,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            header_name: default_header_name(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_cors_origins(),
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 8080,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            logging: LoggingConfig::default(),
            upstream: UpstreamConfig::default(),
            security: SecurityConfig::default(),
            cors: CorsConfig::default(),
            http: SurfaceConfig::default(),
            rpc: default_rpc_surface(),
            max_workers: default_max_workers(),
        }
    }
}

impl AppConfig {
    /// Load the YAML config file at `path`. Missing file falls back to
    /// defaults, matching the original proxy's `load_config` behaviour.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Internal(format!("reading config file: {e}")))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| GatewayError::Internal(format!("parsing config file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.upstream.caps.max_subs, 100);
        assert_eq!(cfg.security.header_name, "Authorization");
        assert!(!cfg.upstream.trading.allow_real_trading);
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_missing() {
        let cfg = AppConfig::load("/nonexistent/path/to/config.yaml").unwrap();
        assert_eq!(cfg.app.name, "market-gateway");
    }

    #[test]
    fn load_parses_partial_yaml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "upstream:\n  caps:\n    max_subs: 5\n").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.upstream.caps.max_subs, 5);
        assert_eq!(cfg.upstream.caps.queue_depth, 1000);
    }
}
