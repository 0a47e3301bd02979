//! Application configuration with layered loading.
//!
//! Loaded in this order (later overrides earlier):
//!
//! 1. Compiled defaults (the struct `Default` implementations)
//! 2. TOML file named by the `CONDUIT_CONFIG` env var
//! 3. `CONDUIT_*` environment variables (e.g. `CONDUIT_NODES__PRIVATE_URL`)
//!
//! Invalid configurations (no public nodes, non-http URLs, zero intervals)
//! fail at load time rather than misbehaving later.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on. Defaults to `3040`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3040
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), bind_port: default_bind_port() }
    }
}

/// Upstream node pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesConfig {
    /// Private, higher-quota node used first for read methods.
    /// Honors the `PRIVATE_RPC_URL` env var as a legacy fallback.
    #[serde(default = "default_private_url")]
    pub private_url: String,

    /// Public nodes: the only candidates for wallet/write methods, and the
    /// read-pool fallback. Cannot be empty.
    #[serde(default = "default_public_urls")]
    pub public_urls: Vec<String>,

    /// Per-attempt upstream timeout in seconds. Defaults to `8`.
    #[serde(default = "default_attempt_timeout_seconds")]
    pub attempt_timeout_seconds: u64,
}

fn default_private_url() -> String {
    std::env::var("PRIVATE_RPC_URL").unwrap_or_else(|_| "https://rpc.cetra.app".to_string())
}

fn default_public_urls() -> Vec<String> {
    vec![
        "https://evm.rpc-testnet-donut-node1.push.org".to_string(),
        "https://evm.rpc-testnet-donut-node2.push.org".to_string(),
    ]
}

fn default_attempt_timeout_seconds() -> u64 {
    8
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            private_url: default_private_url(),
            public_urls: default_public_urls(),
            attempt_timeout_seconds: default_attempt_timeout_seconds(),
        }
    }
}

/// Periodic analytics report settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Whether the periodic reporter runs. Defaults to `true`.
    #[serde(default = "default_analytics_enabled")]
    pub enabled: bool,

    /// Seconds between reports. Defaults to `10`.
    #[serde(default = "default_report_interval_seconds")]
    pub report_interval_seconds: u64,
}

fn default_analytics_enabled() -> bool {
    true
}

fn default_report_interval_seconds() -> u64 {
    10
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: default_analytics_enabled(),
            report_interval_seconds: default_report_interval_seconds(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error". Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "pretty" or "json". Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Root configuration object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub nodes: NodesConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from defaults, the optional `CONDUIT_CONFIG`
    /// TOML file, and `CONDUIT_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be parsed or the merged
    /// configuration fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Ok(path) = std::env::var("CONDUIT_CONFIG") {
            builder = builder.add_source(File::from(Path::new(&path)));
        }

        let config: AppConfig = builder
            .add_source(Environment::with_prefix("CONDUIT").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError::Message`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_port == 0 {
            return Err(ConfigError::Message("server.bind_port must be non-zero".into()));
        }
        if self.nodes.public_urls.is_empty() {
            return Err(ConfigError::Message(
                "nodes.public_urls must contain at least one node".into(),
            ));
        }
        for url in std::iter::once(&self.nodes.private_url).chain(&self.nodes.public_urls) {
            if !url.starts_with("http") {
                return Err(ConfigError::Message(format!("node url must be http(s): {url}")));
            }
        }
        if self.nodes.attempt_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "nodes.attempt_timeout_seconds must be non-zero".into(),
            ));
        }
        if self.analytics.report_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "analytics.report_interval_seconds must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Per-attempt upstream timeout as a [`Duration`].
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.nodes.attempt_timeout_seconds)
    }

    /// Analytics report interval as a [`Duration`].
    #[must_use]
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.analytics.report_interval_seconds)
    }
}
