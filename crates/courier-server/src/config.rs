//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (COURIER_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use courier_core::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of pending messages before eviction kicks in.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Maximum number of registered subscribers.
    #[serde(default = "default_max_subscribers")]
    pub max_subscribers: usize,

    /// Maximum message payload size in bytes, enforced at the HTTP
    /// boundary (the store itself never rejects).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Liveness window in seconds: a subscriber with no heartbeat for
    /// longer than this counts as stale.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_secs: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("COURIER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("COURIER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000)
}

fn default_true() -> bool {
    true
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_max_subscribers() -> usize {
    100
}

fn default_max_message_size() -> usize {
    10_240 // 10 KB
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_subscribers: default_max_subscribers(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "courier.toml",
            "/etc/courier/courier.toml",
            "~/.config/courier/courier.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// The core service configuration derived from the limits.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_queue_size: self.limits.max_queue_size,
            max_subscribers: self.limits.max_subscribers,
            heartbeat_timeout: Duration::from_secs(self.heartbeat.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.limits.max_queue_size, 1000);
        assert_eq!(config.limits.max_subscribers, 100);
        assert_eq!(config.limits.max_message_size, 10_240);
        assert_eq!(config.heartbeat.timeout_secs, 60);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 5000,
            ..Config::default()
        };
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 5000);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_queue_size = 50

            [heartbeat]
            timeout_secs = 15
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_queue_size, 50);
        // Unspecified sections keep their defaults
        assert_eq!(config.limits.max_subscribers, 100);
        assert_eq!(config.heartbeat.timeout_secs, 15);
    }

    #[test]
    fn test_service_config_conversion() {
        let config = Config::default();
        let service = config.service_config();
        assert_eq!(service.max_queue_size, 1000);
        assert_eq!(service.heartbeat_timeout, Duration::from_secs(60));
    }
}
