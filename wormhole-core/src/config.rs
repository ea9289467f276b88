use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Inactivity window observed in the product: 5 seconds
pub const DEFAULT_TTL_MS: u64 = 5000;

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    /// How long shutdown waits for connected clients to go away
    pub shutdown_drain_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 3000,
            shutdown_drain_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Milliseconds after the last write before the value reverts to empty
    pub ttl_ms: u64,
    /// Capacity of each subscriber's delivery queue
    pub subscriber_buffer: usize,
    /// Upper bound on a long-poll request before it returns the current value
    pub long_poll_timeout_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            long_poll_timeout_seconds: 30,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    #[must_use]
    pub const fn long_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.long_poll_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> crate::Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // WORMHOLE_SYNC__TTL_MS, WORMHOLE_SERVER__HTTP_PORT, ...
        builder = builder.add_source(
            Environment::with_prefix("WORMHOLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> crate::Result<Self> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> crate::Result<Self> {
        Self::load(Some(path))
    }

    /// Check for misconfigurations, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if self.sync.ttl_ms == 0 {
            errors.push("sync.ttl_ms must be greater than 0".to_string());
        }
        if self.sync.subscriber_buffer == 0 {
            errors.push("sync.subscriber_buffer must be greater than 0".to_string());
        }
        if self.sync.long_poll_timeout_seconds == 0 {
            errors.push("sync.long_poll_timeout_seconds must be greater than 0".to_string());
        }
        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format '{}' must be \"json\" or \"pretty\"",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}
