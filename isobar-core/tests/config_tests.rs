use isobar_core::{ClientConfig, ConfigError, RetryConfig, SearchConfig};
use proptest::prelude::*;
use std::io::Write;

fn base_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "https://forecast.example.org".to_string(),
        request_timeout_ms: 5_000,
        api_key: Some("test-key".to_string()),
        ..ClientConfig::default()
    }
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
api_base_url = "https://forecast.example.org"
request_timeout_ms = 1500

[retry]
max_attempts = 2
base_delay_ms = 50
retryable_statuses = [503]
"#
    )
    .unwrap();

    let config = ClientConfig::from_path(file.path()).unwrap();
    assert_eq!(config.request_timeout_ms, 1500);
    assert_eq!(
        config.retry,
        RetryConfig {
            max_attempts: 2,
            base_delay_ms: 50,
            retryable_statuses: vec![503],
        }
    );
    assert_eq!(config.search, SearchConfig::default());
}

#[test]
fn missing_file_reports_path() {
    let err = ClientConfig::from_path(std::path::Path::new("/nonexistent/isobar.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(format!("{}", err).contains("/nonexistent/isobar.toml"));
}

#[test]
fn config_requires_base_url() {
    let mut config = base_config();
    config.api_base_url = "   ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn config_rejects_blank_api_key() {
    let mut config = base_config();
    config.api_key = Some(String::new());
    assert!(config.validate().is_err());
}

proptest! {
    #[test]
    fn retry_config_validation(attempts in 1u32..10, delay in 1u64..5_000, status in 500u16..=599) {
        let mut config = base_config();
        config.retry = RetryConfig {
            max_attempts: attempts,
            base_delay_ms: delay,
            retryable_statuses: vec![status],
        };
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_search_percentile_rejected(percentile in 101u8..=255) {
        let mut config = base_config();
        config.search.percentile = percentile;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected(attempts in 1u32..10) {
        let mut config = base_config();
        config.retry.max_attempts = attempts;
        config.request_timeout_ms = 0;
        prop_assert!(config.validate().is_err());
    }
}
