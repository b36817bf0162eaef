//! Outbound transport for the fetch layer.
//!
//! [`Transport`] performs exactly one GET and reports what came back; it
//! never retries. [`HttpTransport`] is the `reqwest` implementation used in
//! production.

use std::time::Duration;

use async_trait::async_trait;
use isobar_core::{ClientConfig, ConfigError, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// A response that made it back over the wire, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    /// 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single outbound GET.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `GET <endpoint>`.
    ///
    /// Returns `Err` only when no HTTP response was obtained. Non-2xx
    /// statuses come back as `Ok` for the caller to classify.
    async fn get(&self, endpoint: &str) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport resolving endpoints against a base URL.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "http_client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            headers: build_headers(config.api_key.as_deref())?,
        })
    }

    /// Build with an explicit timeout and no credentials.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let config = ClientConfig {
            api_base_url: base_url.to_string(),
            request_timeout_ms: timeout.as_millis().max(1) as u64,
            ..ClientConfig::default()
        };
        Self::new(&config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URLs pass through untouched; paths are joined to the base.
    pub fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, endpoint: &str) -> Result<TransportResponse, TransportError> {
        let url = self.resolve(endpoint);
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| classify(endpoint, e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(endpoint, e))?;

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_vec(),
        })
    }
}

fn classify(endpoint: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else if err.is_builder() {
        TransportError::InvalidRequest {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else {
        TransportError::Network {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

fn build_headers(api_key: Option<&str>) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ConfigError::InvalidValue {
                field: "api_key",
                reason: e.to_string(),
            })?,
        );
    }
    Ok(headers)
}
