//! # Logging
//!
//! Installs the global `tracing` subscriber.
//!
//! `RUST_LOG` takes precedence. Without it the filter is built from
//! `LOG_LEVEL` for this crate and `warn` for dependencies. `LOG_FORMAT`
//! selects JSON (default) or human readable text output.

use crate::config::ControllerConfig;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.trim().to_ascii_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        _ => "info".to_string(),
    };
    format!("warn,keycloak_operator={level}")
}

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json_logs() {
        builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;
    }

    Ok(())
}
