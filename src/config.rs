//! # Configuration Management
//!
//! Centralized configuration for the connection engine.
//!
//! This module provides structured configuration for the server front end:
//! listener addresses, admission limits, handshake and heartbeat settings,
//! transport buffer sizes, and logging options.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `from_env()`
//!
//! ## Security Considerations
//! - The maximum body length bounds per-frame allocation from remote input
//! - The receive-timeout window is fixed at twice the heartbeat interval
//! - TLS settings enforce modern cryptography (TLS 1.2+)

use crate::error::{GateError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed frame body length (16 MiB) unless configured otherwise.
pub const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// Default read-buffer capacity per connection.
pub const DEFAULT_READ_BUFFER: usize = 8 * 1024;

/// Default write-buffer capacity per connection.
pub const DEFAULT_WRITE_BUFFER: usize = 8 * 1024;

/// Main configuration structure containing all recognized settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct GateConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GateConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| GateError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| GateError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| GateError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("GATENET_TCP_ADDRESS") {
            config.server.tcp_address = if addr.is_empty() { None } else { Some(addr) };
        }

        if let Ok(addr) = std::env::var("GATENET_WS_ADDRESS") {
            config.server.ws_address = if addr.is_empty() { None } else { Some(addr) };
        }

        if let Ok(max) = std::env::var("GATENET_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        if let Ok(key) = std::env::var("GATENET_HANDSHAKE_KEY") {
            config.server.handshake_key = key;
        }

        if let Ok(heartbeat) = std::env::var("GATENET_HEARTBEAT_MS") {
            if let Ok(val) = heartbeat.parse::<u64>() {
                config.server.heartbeat_interval = Duration::from_millis(val);
            }
        }

        if let Ok(max_body) = std::env::var("GATENET_MAX_BODY_LEN") {
            if let Ok(val) = max_body.parse::<usize>() {
                config.transport.max_body_len = val;
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GateError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// TCP listen address (e.g., "0.0.0.0:7350"); `None` disables TCP
    pub tcp_address: Option<String>,

    /// WebSocket listen address (e.g., "0.0.0.0:7351"); `None` disables WebSocket
    pub ws_address: Option<String>,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Shared handshake key; an empty key accepts any client
    pub handshake_key: String,

    /// Heartbeat interval; zero disables the monitor. The receive-timeout
    /// window is twice this value.
    #[serde(with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Deadline for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tcp_address: Some(String::from("127.0.0.1:7350")),
            ws_address: None,
            max_connections: 1024,
            handshake_key: String::new(),
            heartbeat_interval: timeout::KEEPALIVE_INTERVAL,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.tcp_address.is_none() && self.ws_address.is_none() {
            errors.push("At least one listener (tcp_address or ws_address) must be set".to_string());
        }

        for (name, addr) in [
            ("tcp_address", &self.tcp_address),
            ("ws_address", &self.ws_address),
        ] {
            if let Some(addr) = addr {
                if addr.parse::<std::net::SocketAddr>().is_err() {
                    errors.push(format!(
                        "Invalid {name} format: '{addr}' (expected format: '0.0.0.0:7350')"
                    ));
                }
            }
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if !self.heartbeat_interval.is_zero() {
            if self.heartbeat_interval.as_millis() < 100 {
                errors.push("Heartbeat interval too short (minimum: 100ms)".to_string());
            } else if self.heartbeat_interval.as_secs() > 3600 {
                errors.push("Heartbeat interval too long (maximum: 1 hour)".to_string());
            }
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Maximum allowed frame body length in bytes
    pub max_body_len: usize,

    /// Per-connection read buffer capacity
    pub read_buffer_size: usize,

    /// Per-connection write buffer capacity
    pub write_buffer_size: usize,

    /// Path to the TLS certificate chain (PEM); enables TLS on the TCP listener
    pub tls_cert_path: Option<String>,

    /// Path to the TLS private key (PEM, PKCS#8)
    pub tls_key_path: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_body_len: MAX_BODY_LEN,
            read_buffer_size: DEFAULT_READ_BUFFER,
            write_buffer_size: DEFAULT_WRITE_BUFFER,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_body_len == 0 {
            errors.push("Max body length cannot be 0".to_string());
        } else if self.max_body_len > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max body length too large: {} bytes (maximum recommended: 100 MB)",
                self.max_body_len
            ));
        }

        if self.read_buffer_size == 0 {
            errors.push("Read buffer size cannot be 0".to_string());
        }
        if self.write_buffer_size == 0 {
            errors.push("Write buffer size cannot be 0".to_string());
        }

        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            errors.push(
                "TLS requires both tls_cert_path and tls_key_path to be set".to_string(),
            );
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to file instead of the console
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gatenet"),
            log_level: Level::INFO,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
