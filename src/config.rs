//! Configuration management
//!
//! Handles loading and validating configuration from TOML files. Every
//! section is optional; missing values fall back to the defaults below.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Default per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Largest accepted frame payload in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    /// Disable Nagle's algorithm
    #[serde(default = "default_true")]
    pub nodelay: bool,
    /// TCP keep-alive idle time in seconds (0 = disabled)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn keepalive(&self) -> Option<Duration> {
        (self.keepalive_secs > 0).then(|| Duration::from_secs(self.keepalive_secs))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_frame_len: default_max_frame_len(),
            nodelay: default_true(),
            keepalive_secs: default_keepalive(),
        }
    }
}

/// Caller-side retry policy (see [`crate::retry`])
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_backoff")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Give up once this much time has passed since the first attempt
    #[serde(default = "default_retry_deadline")]
    pub deadline_ms: u64,
    /// Exponential growth factor between attempts
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
    /// Randomize each delay between the minimum and the computed value
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl RetryConfig {
    pub fn min_backoff(&self) -> Duration {
        Duration::from_millis(self.min_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_backoff_ms: default_min_backoff(),
            max_backoff_ms: default_max_backoff(),
            deadline_ms: default_retry_deadline(),
            factor: default_backoff_factor(),
            jitter: default_true(),
        }
    }
}

/// Reference server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the TCP listener
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Number of worker threads (0 = auto)
    #[serde(default)]
    pub workers: usize,
    /// Artificial delay before each response, in milliseconds
    #[serde(default)]
    pub response_delay_ms: u64,
    /// Largest accepted frame payload in bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl ServerConfig {
    /// Get effective worker count (auto-detect if 0)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            workers: 0,
            response_delay_ms: 0,
            max_frame_len: default_max_frame_len(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint
    #[serde(default)]
    pub enabled: bool,
    /// Metrics server bind address
    #[serde(default = "default_metrics_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_metrics_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_connect_timeout() -> u64 { 3_000 }
fn default_request_timeout() -> u64 { 5_000 }
fn default_max_frame_len() -> usize { 64 * 1024 }
fn default_true() -> bool { true }
fn default_keepalive() -> u64 { 60 }
fn default_max_attempts() -> u32 { 5 }
fn default_min_backoff() -> u64 { 1 }
fn default_max_backoff() -> u64 { 100 }
fn default_retry_deadline() -> u64 { 10_000 }
fn default_backoff_factor() -> f64 { 2.0 }
fn default_bind_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 51015)) }
fn default_metrics_addr() -> SocketAddr { SocketAddr::from(([127, 0, 0, 1], 9090)) }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&contents)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.client.connect_timeout_ms == 0 {
            anyhow::bail!("client.connect_timeout_ms must be > 0");
        }
        if self.client.request_timeout_ms == 0 {
            anyhow::bail!("client.request_timeout_ms must be > 0");
        }
        if self.client.max_frame_len == 0 || self.server.max_frame_len == 0 {
            anyhow::bail!("max_frame_len must be > 0");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be > 0");
        }
        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            anyhow::bail!("retry.min_backoff_ms must not exceed retry.max_backoff_ms");
        }
        if self.retry.factor < 1.0 {
            anyhow::bail!("retry.factor must be >= 1.0");
        }
        Ok(())
    }
}
