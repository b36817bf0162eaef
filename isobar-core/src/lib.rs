//! ISOBAR Core
//!
//! Shared building blocks for the forecast dashboard data core: the error
//! taxonomy, client configuration, cache key construction, forecast date
//! layouts and logging setup.

pub mod config;
pub mod date;
pub mod error;
pub mod key;
pub mod telemetry;

pub use config::{
    CacheConfig, ClientConfig, LoggingConfig, RetryConfig, SearchConfig,
    DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRYABLE_STATUSES,
    DEFAULT_SEARCH_ATTEMPTS,
};
pub use date::{DatePattern, ForecastDate};
pub use error::{
    ConfigError, DateError, FetchError, FetchResult, IsobarError, IsobarResult, TelemetryError,
    TransportError,
};
pub use key::{CacheKey, CacheKeyBuilder};
pub use telemetry::init_logging;
