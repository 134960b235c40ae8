//! Structured logging configuration.
//!
//! Initializes the global `tracing` subscriber from a [`LoggingConfig`].
//! Console output honors `RUST_LOG` when set; otherwise the configured level
//! applies to the whole process.

use crate::config::LoggingConfig;
use crate::error::{GateError, Result};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once at process startup; a second
/// call reports an error instead of panicking.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let result = if config.log_to_file {
        let path = config
            .log_file_path
            .as_deref()
            .ok_or_else(|| GateError::ConfigError("log_file_path is required when log_to_file is set".into()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| GateError::ConfigError(format!("Failed to open log file {path}: {e}")))?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(file))
            .with_ansi(false);
        if config.json_format {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    } else {
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        if config.json_format {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
    };

    result.map_err(|e| GateError::ConfigError(format!("Failed to install subscriber: {e}")))
}
