//! Logging initialisation.
//!
//! The core only emits `tracing` events; installing a subscriber is left to
//! the embedding application, which can call [`init_logging`] once at
//! startup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::TelemetryError;

/// Environment variable overriding the configured filter directive.
pub const LOG_ENV_VAR: &str = "ISOBAR_LOG";

/// Build the filter: `ISOBAR_LOG` wins over the configured directive.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV_VAR) {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| TelemetryError::InvalidFilter {
        directive: config.filter.clone(),
        reason: e.to_string(),
    })
}

/// Install a global `fmt` subscriber.
///
/// Returns an error rather than panicking if a global subscriber has
/// already been installed (for example by a test harness).
pub fn init_logging(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;
    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };
    result.map_err(|e| TelemetryError::Install(e.to_string()))?;
    tracing::debug!(json = config.json, "Logging initialised");
    Ok(())
}
