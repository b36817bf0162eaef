//! Resilient fetch client.
//!
//! Wraps a [`Transport`] with retry/backoff and coalesces concurrent calls
//! for the same endpoint into one shared pending operation. Operations run
//! on their own task, so they settle even when every caller gives up.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use isobar_core::{ClientConfig, ConfigError, FetchError, FetchResult};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;
use crate::transport::{HttpTransport, Transport, TransportResponse};

type PendingRequest = Shared<BoxFuture<'static, FetchResult<Value>>>;

/// HTTP client with retry, backoff and in-flight de-duplication.
///
/// Cloning is cheap; clones share the transport and the in-flight map.
#[derive(Clone)]
pub struct ResilientClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    /// Endpoint -> pending operation. An entry lives exactly as long as its
    /// operation is unsettled.
    in_flight: DashMap<String, PendingRequest>,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                policy,
                in_flight: DashMap::new(),
            }),
        }
    }

    /// Client over `transport` with the default retry schedule.
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self::new(Arc::new(transport), RetryPolicy::default())
    }

    /// Production client: `reqwest` transport configured from `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(
            Arc::new(transport),
            RetryPolicy::from(&config.retry),
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Number of endpoints with an unsettled operation.
    pub fn in_flight_len(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// GET `endpoint` and parse the body as JSON.
    ///
    /// A call made while another call for the same endpoint is pending
    /// joins it instead of issuing a new request; every joined caller sees
    /// the same value or the same error.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn request(&self, endpoint: &str) -> FetchResult<Value> {
        let pending = match self.inner.in_flight.entry(endpoint.to_string()) {
            Entry::Occupied(entry) => {
                debug!(endpoint, "Joining in-flight request");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let pending = dispatch(Arc::clone(&self.inner), endpoint.to_string());
                entry.insert(pending.clone());
                pending
            }
        };
        pending.await
    }

    /// GET `endpoint` and deserialize the JSON body into `T`.
    pub async fn request_json<T: DeserializeOwned>(&self, endpoint: &str) -> FetchResult<T> {
        let value = self.request(endpoint).await?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Spawn the operation for `endpoint` and return a shared handle to it.
///
/// The task removes its own map entry when it settles, whether or not
/// anyone is still waiting on the handle.
fn dispatch(inner: Arc<ClientInner>, endpoint: String) -> PendingRequest {
    let task = tokio::spawn({
        let endpoint = endpoint.clone();
        async move {
            let result = inner.fetch_with_retry(&endpoint).await;
            inner.in_flight.remove(&endpoint);
            result
        }
    });
    task.map(move |joined| {
        joined.unwrap_or_else(|e| {
            warn!(endpoint = %endpoint, error = %e, "Request task did not complete");
            Err(FetchError::Aborted {
                endpoint,
                reason: e.to_string(),
            })
        })
    })
    .boxed()
    .shared()
}

impl ClientInner {
    async fn fetch_with_retry(&self, endpoint: &str) -> FetchResult<Value> {
        let mut attempt: u32 = 1;
        loop {
            debug!(endpoint, attempt, "Dispatching request");
            match self.transport.get(endpoint).await {
                Ok(response) if response.is_success() => {
                    return decode_body(endpoint, &response);
                }
                Ok(response) => {
                    let retryable = self.policy.is_retryable_status(response.status);
                    if !retryable || !self.policy.has_attempts_after(attempt) {
                        warn!(
                            endpoint,
                            attempt,
                            status = response.status,
                            retryable,
                            "Request failed with non-success status"
                        );
                        return Err(FetchError::Status {
                            status: response.status,
                            status_text: response.status_text,
                        });
                    }
                    let delay = self.policy.delay_before_retry(attempt);
                    warn!(
                        endpoint,
                        attempt,
                        status = response.status,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable status, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if !self.policy.has_attempts_after(attempt) {
                        warn!(endpoint, attempt, error = %err, "Request failed, retries exhausted");
                        return Err(FetchError::Transport(err));
                    }
                    let delay = self.policy.delay_before_retry(attempt);
                    warn!(
                        endpoint,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Transport failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }
}

fn decode_body(endpoint: &str, response: &TransportResponse) -> FetchResult<Value> {
    // 204 and friends carry no body.
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&response.body).map_err(|e| FetchError::Decode {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}
