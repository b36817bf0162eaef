//! Configuration for the ISOBAR data core.
//!
//! The embedding application owns the config file; the core only parses
//! and validates what it is handed. Sections other than the base URL fall
//! back to the documented defaults when omitted.
//!
//! [`ClientConfig::from_path`] is a convenience for applications that keep
//! the document on disk. The core never looks for a file on its own.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Statuses retried by default: transient gateway and server failures.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 4] = [500, 502, 503, 504];
/// Total call attempts (initial call plus three retries).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
/// Delay before the first retry; doubled for every retry after it.
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;
/// Probing iterations before a date search gives up.
pub const DEFAULT_SEARCH_ATTEMPTS: u32 = 12;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub retryable_statuses: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL applied by consumers that do not pick their own. `None` keeps
    /// entries fresh until invalidated.
    #[serde(default)]
    pub default_ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub max_attempts: u32,
    pub percentile: u8,
    pub normalization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SEARCH_ATTEMPTS,
            percentile: 50,
            normalization: "none".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            api_key: None,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_ms.map(Duration::from_millis)
    }
}

impl ClientConfig {
    /// Read the TOML document at a path the application chose, then parse
    /// it with [`from_toml_str`](Self::from_toml_str).
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api_base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "api_key",
                    reason: "must not be blank when provided".to_string(),
                });
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if let Some(status) = self
            .retry
            .retryable_statuses
            .iter()
            .find(|status| !(500..=599).contains(*status))
        {
            return Err(ConfigError::InvalidValue {
                field: "retry.retryable_statuses",
                reason: format!("{} is not a 5xx status", status),
            });
        }
        if self.cache.default_ttl_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "cache.default_ttl_ms",
                reason: "must be > 0 when provided".to_string(),
            });
        }
        if self.search.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "search.max_attempts",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.search.percentile > 100 {
            return Err(ConfigError::InvalidValue {
                field: "search.percentile",
                reason: "must be <= 100".to_string(),
            });
        }
        if self.search.normalization.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "search.normalization",
                reason: "must not be empty".to_string(),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
