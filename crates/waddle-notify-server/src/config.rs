//! Server configuration from command-line flags and environment variables.
//!
//! Every flag has an environment fallback, so the server can be configured
//! either way:
//!
//! ```bash
//! waddle-notify-server --bind 127.0.0.1:8080 --retry-interval-secs 10
//! # or
//! NOTIFY_BIND_ADDR=127.0.0.1:8080 NOTIFY_RETRY_INTERVAL_SECS=10 waddle-notify-server
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};
use thiserror::Error;
use tracing::info;
use waddle_notify::NotifyConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// Multi-line colored output for local development
    Pretty,
    /// Newline-delimited JSON for log collectors
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Compact => write!(f, "compact"),
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Waddle notification relay
#[derive(Debug, Parser)]
#[command(name = "waddle-notify-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address the HTTP/WebSocket listener binds to
    #[arg(long, env = "NOTIFY_BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Seconds between periodic retry sweeps
    #[arg(long, env = "NOTIFY_RETRY_INTERVAL_SECS", default_value_t = 30)]
    pub retry_interval_secs: u64,

    /// Milliseconds a single write may take before it counts as failed
    #[arg(long, env = "NOTIFY_WRITE_TIMEOUT_MS", default_value_t = 5000)]
    pub write_timeout_ms: u64,

    /// Pending messages kept per client before the oldest is evicted
    #[arg(long, env = "NOTIFY_MAX_PENDING_PER_CLIENT")]
    pub max_pending_per_client: Option<usize>,

    /// Largest accepted notification body in bytes
    #[arg(long, env = "NOTIFY_MAX_MESSAGE_BYTES", default_value_t = 65536)]
    pub max_message_bytes: usize,

    /// Replay a client's backlog as soon as it connects
    #[arg(
        long,
        env = "NOTIFY_RETRY_ON_CONNECT",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub retry_on_connect: bool,

    /// Comma-separated list of allowed CORS origins (permissive when unset)
    #[arg(long, env = "NOTIFY_CORS_ORIGINS")]
    pub cors_origins: Option<String>,

    /// Log output format
    #[arg(long, env = "NOTIFY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration setting was zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A size limit was zero
    #[error("{0} must be greater than zero when set")]
    ZeroLimit(&'static str),
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener address
    pub bind_addr: SocketAddr,
    /// Period of the retry sweeper
    pub retry_interval: Duration,
    /// Per-write timeout
    pub write_timeout: Duration,
    /// Per-client backlog cap
    pub max_pending_per_client: Option<usize>,
    /// Largest accepted notification
    pub max_message_bytes: usize,
    /// Replay backlog on connect
    pub retry_on_connect: bool,
    /// Raw CORS origin list
    pub cors_origins: Option<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if cli.retry_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("retry interval"));
        }
        if cli.write_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("write timeout"));
        }
        if cli.max_pending_per_client == Some(0) {
            return Err(ConfigError::ZeroLimit("max pending per client"));
        }
        if cli.max_message_bytes == 0 {
            return Err(ConfigError::ZeroLimit("max message bytes"));
        }

        Ok(Self {
            bind_addr: cli.bind,
            retry_interval: Duration::from_secs(cli.retry_interval_secs),
            write_timeout: Duration::from_millis(cli.write_timeout_ms),
            max_pending_per_client: cli.max_pending_per_client,
            max_message_bytes: cli.max_message_bytes,
            retry_on_connect: cli.retry_on_connect,
            cors_origins: cli.cors_origins.filter(|origins| !origins.trim().is_empty()),
            log_format: cli.log_format,
        })
    }
}

impl ServerConfig {
    /// Parse flags and environment, then validate.
    pub fn load() -> Result<Self, ConfigError> {
        Self::try_from(Cli::parse())
    }

    /// Core service settings derived from this configuration.
    pub fn to_notify_config(&self) -> NotifyConfig {
        NotifyConfig {
            write_timeout: self.write_timeout,
            retry_interval: self.retry_interval,
            max_pending_per_client: self.max_pending_per_client,
            max_message_bytes: self.max_message_bytes,
            retry_on_connect: self.retry_on_connect,
        }
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);
        info!("Retry interval: {:?}", self.retry_interval);
        info!("Write timeout: {:?}", self.write_timeout);
        match self.max_pending_per_client {
            Some(max) => info!("Max pending per client: {}", max),
            None => info!("Max pending per client: unlimited"),
        }
        info!("Max message size: {} bytes", self.max_message_bytes);
        info!(
            "Retry on connect: {}",
            if self.retry_on_connect { "enabled" } else { "disabled" }
        );
        match &self.cors_origins {
            Some(origins) => info!("CORS origins: {}", origins),
            None => info!("CORS origins: permissive"),
        }
    }

    /// Configuration for tests: ephemeral port, defaults otherwise.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let defaults = NotifyConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            retry_interval: defaults.retry_interval,
            write_timeout: defaults.write_timeout,
            max_pending_per_client: defaults.max_pending_per_client,
            max_message_bytes: defaults.max_message_bytes,
            retry_on_connect: defaults.retry_on_connect,
            cors_origins: None,
            log_format: LogFormat::Compact,
        }
    }
}
