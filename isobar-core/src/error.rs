//! Error types for ISOBAR operations

use std::path::PathBuf;
use thiserror::Error;

/// Transport-level failures: the request never produced an HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network failure for {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Request to {endpoint} timed out: {reason}")]
    Timeout { endpoint: String, reason: String },

    #[error("Invalid request for {endpoint}: {reason}")]
    InvalidRequest { endpoint: String, reason: String },
}

impl TransportError {
    /// The endpoint the failed call targeted.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Network { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::InvalidRequest { endpoint, .. } => endpoint,
        }
    }
}

/// Errors surfaced by the resilient fetch layer.
///
/// `Clone` so that a single in-flight operation can hand the same failure
/// to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status} {status_text}")]
    Status { status: u16, status_text: String },

    #[error("Failed to decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    /// The task running the request panicked or was shut down.
    #[error("Request to {endpoint} aborted: {reason}")]
    Aborted { endpoint: String, reason: String },
}

impl FetchError {
    /// Numeric HTTP status, if the failure carried one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for failures that happened below the HTTP layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Forecast date parsing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("Unrecognised forecast date format: '{raw}'")]
    Unrecognized { raw: String },

    #[error("Forecast date out of range: {reason}")]
    OutOfRange { reason: String },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Logging initialisation errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter directive '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Master error type for all ISOBAR errors.
#[derive(Debug, Error)]
pub enum IsobarError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Date error: {0}")]
    Date(#[from] DateError),
}

impl From<TransportError> for IsobarError {
    fn from(err: TransportError) -> Self {
        Self::Fetch(FetchError::Transport(err))
    }
}

/// Result type alias for ISOBAR operations.
pub type IsobarResult<T> = Result<T, IsobarError>;

/// Result type alias for fetch-layer operations.
pub type FetchResult<T> = Result<T, FetchError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display_carries_code_and_text() {
        let err = FetchError::Status {
            status: 503,
            status_text: "Service Unavailable".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("503"));
        assert!(msg.contains("Service Unavailable"));
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_transport_error_converts_into_fetch_error() {
        let err: FetchError = TransportError::Network {
            endpoint: "/api/x".to_string(),
            reason: "connection refused".to_string(),
        }
        .into();
        assert!(err.is_transport());
        assert_eq!(err.status(), None);
        assert!(format!("{}", err).contains("connection refused"));
    }

    #[test]
    fn test_transport_error_endpoint() {
        let err = TransportError::Timeout {
            endpoint: "/api/slow".to_string(),
            reason: "elapsed".to_string(),
        };
        assert_eq!(err.endpoint(), "/api/slow");
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "api_base_url",
            reason: "must not be empty".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("api_base_url"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_master_error_wraps_transport() {
        let err: IsobarError = TransportError::Network {
            endpoint: "/e".to_string(),
            reason: "reset".to_string(),
        }
        .into();
        assert!(matches!(err, IsobarError::Fetch(FetchError::Transport(_))));
    }
}
