//! ISOBAR Test Utilities
//!
//! Shared test infrastructure for the ISOBAR workspace:
//! - Scripted transports standing in for the dashboard API
//! - Scripted forecast probes for the date search
//! - Gated loaders to settle request cycles in a chosen order
//! - Fixtures and proptest generators

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use proptest::prelude::*;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;

pub use isobar_core::{ClientConfig, FetchError, FetchResult, TransportError};
pub use isobar_fetch::{ResilientClient, RetryPolicy, Transport, TransportResponse};
pub use isobar_search::{AggregateSummary, Availability, ForecastProbe, LeadSeries, SummaryBaseline};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SCRIPTED TRANSPORT
// ============================================================================

/// One canned transport outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// 200 with a JSON body.
    Json(Value),
    /// Empty body with this status.
    Status(u16),
    /// No response at all.
    NetworkError(String),
    /// Arbitrary status and body bytes.
    Raw(u16, Vec<u8>),
}

impl ScriptedReply {
    fn into_result(self, endpoint: &str) -> Result<TransportResponse, TransportError> {
        match self {
            Self::Json(value) => Ok(TransportResponse::new(200, "OK", value.to_string())),
            Self::Status(status) => Ok(TransportResponse::new(status, status_text(status), Vec::new())),
            Self::Raw(status, body) => Ok(TransportResponse::new(status, status_text(status), body)),
            Self::NetworkError(reason) => Err(TransportError::Network {
                endpoint: endpoint.to_string(),
                reason,
            }),
        }
    }
}

/// Canonical reason phrase for the statuses tests use.
pub fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// A transport call as observed by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub endpoint: String,
    pub at: Instant,
}

type Responder = Box<dyn Fn(&str, u32) -> ScriptedReply + Send + Sync>;

/// In-memory [`Transport`] answering from a script.
///
/// The responder receives the endpoint and the 1-indexed call number for
/// that endpoint.
pub struct ScriptedTransport {
    responder: Responder,
    latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&str, u32) -> ScriptedReply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Same reply to every call.
    pub fn always(reply: ScriptedReply) -> Self {
        Self::from_fn(move |_, _| reply.clone())
    }

    /// Call `n` to an endpoint gets `replies[n - 1]`; later calls get `then`.
    pub fn sequence(replies: Vec<ScriptedReply>, then: ScriptedReply) -> Self {
        Self::from_fn(move |_, call| {
            replies
                .get(call as usize - 1)
                .cloned()
                .unwrap_or_else(|| then.clone())
        })
    }

    /// Delay every reply by `latency` (tokio time, so pausable).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Share behind an `Arc` so the test keeps a handle for assertions.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, endpoint: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }

    /// When each call arrived, in order.
    pub fn call_times(&self) -> Vec<Instant> {
        lock(&self.calls).iter().map(|call| call.at).collect()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, endpoint: &str) -> Result<TransportResponse, TransportError> {
        let call = {
            let mut calls = lock(&self.calls);
            calls.push(RecordedCall {
                endpoint: endpoint.to_string(),
                at: Instant::now(),
            });
            calls.iter().filter(|call| call.endpoint == endpoint).count() as u32
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(endpoint, call).into_result(endpoint)
    }
}

/// Client over `transport` with the default retry schedule.
pub fn scripted_client(transport: &Arc<ScriptedTransport>) -> ResilientClient {
    ResilientClient::new(Arc::clone(transport) as Arc<dyn Transport>, RetryPolicy::default())
}

// ============================================================================
// SCRIPTED FORECAST PROBE
// ============================================================================

type AvailabilityFn = Box<dyn Fn(&str) -> FetchResult<Availability> + Send + Sync>;
type SummaryFn = Box<dyn Fn(&str) -> FetchResult<AggregateSummary> + Send + Sync>;

/// In-memory [`ForecastProbe`] keyed on the candidate date string.
///
/// Defaults to "no run anywhere".
pub struct ScriptedProbe {
    availability: AvailabilityFn,
    summary: SummaryFn,
    latency: Duration,
    availability_calls: Mutex<Vec<String>>,
    summary_calls: Mutex<Vec<String>>,
}

impl Default for ScriptedProbe {
    fn default() -> Self {
        Self {
            availability: Box::new(|_| Ok(Availability::default())),
            summary: Box::new(|_| Ok(AggregateSummary::default())),
            latency: Duration::ZERO,
            availability_calls: Mutex::new(Vec::new()),
            summary_calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedProbe {
    pub fn never_available() -> Self {
        Self::default()
    }

    /// Runs exist with usable content exactly at `dates`.
    pub fn usable_at(dates: &[&str]) -> Self {
        let dates: Arc<HashSet<String>> = Arc::new(dates.iter().map(|d| d.to_string()).collect());
        let usable = Arc::clone(&dates);
        Self::default()
            .with_availability(move |date| Ok(available(dates.contains(date))))
            .with_summary(move |date| {
                Ok(if usable.contains(date) {
                    usable_summary()
                } else {
                    AggregateSummary::default()
                })
            })
    }

    pub fn with_availability<F>(mut self, availability: F) -> Self
    where
        F: Fn(&str) -> FetchResult<Availability> + Send + Sync + 'static,
    {
        self.availability = Box::new(availability);
        self
    }

    pub fn with_summary<F>(mut self, summary: F) -> Self
    where
        F: Fn(&str) -> FetchResult<AggregateSummary> + Send + Sync + 'static,
    {
        self.summary = Box::new(summary);
        self
    }

    /// Delay every probe by `latency` (tokio time, so pausable).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Candidate dates passed to `availability`, in order.
    pub fn availability_calls(&self) -> Vec<String> {
        lock(&self.availability_calls).clone()
    }

    /// Candidate dates passed to `summary`, in order.
    pub fn summary_calls(&self) -> Vec<String> {
        lock(&self.summary_calls).clone()
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ForecastProbe for ScriptedProbe {
    async fn availability(&self, _workspace: &str, date: &str) -> FetchResult<Availability> {
        lock(&self.availability_calls).push(date.to_string());
        self.pause().await;
        (self.availability)(date)
    }

    async fn summary(
        &self,
        _workspace: &str,
        date: &str,
        _baseline: &SummaryBaseline,
    ) -> FetchResult<AggregateSummary> {
        lock(&self.summary_calls).push(date.to_string());
        self.pause().await;
        (self.summary)(date)
    }
}

pub fn available(available: bool) -> Availability {
    Availability {
        available,
        member_count: None,
    }
}

/// Summary with one populated lead series.
pub fn usable_summary() -> AggregateSummary {
    AggregateSummary {
        series: vec![LeadSeries {
            name: "t2m".to_string(),
            lead_hours: vec![0, 6, 12],
            values: vec![Some(271.4), Some(272.0), None],
        }],
    }
}

/// Summary whose only series has no values.
pub fn hollow_summary() -> AggregateSummary {
    AggregateSummary {
        series: vec![LeadSeries {
            name: "t2m".to_string(),
            ..LeadSeries::default()
        }],
    }
}

/// A 503 as the fetch layer reports it once retries are spent.
pub fn unavailable_error() -> FetchError {
    FetchError::Status {
        status: 503,
        status_text: status_text(503).to_string(),
    }
}

// ============================================================================
// GATED LOADER
// ============================================================================

type Gate<T> = Option<oneshot::Sender<FetchResult<T>>>;

/// Loader whose calls stay pending until the test resolves them.
///
/// Resolving before the pending future is polled is fine; the result is
/// buffered.
pub struct GatedLoader<T> {
    gates: Arc<Mutex<Vec<Gate<T>>>>,
}

impl<T> Default for GatedLoader<T> {
    fn default() -> Self {
        Self {
            gates: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Send + 'static> GatedLoader<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader closure that opens a new gate per call.
    pub fn loader<D: 'static>(
        &self,
    ) -> impl Fn(&D) -> BoxFuture<'static, FetchResult<T>> + Send + Sync + 'static {
        let gates = Arc::clone(&self.gates);
        move |_: &D| {
            let (sender, receiver) = oneshot::channel();
            lock(&gates).push(Some(sender));
            async move {
                receiver.await.unwrap_or_else(|_| {
                    Err(FetchError::Transport(TransportError::Network {
                        endpoint: "gated-loader".to_string(),
                        reason: "gate dropped".to_string(),
                    }))
                })
            }
            .boxed()
        }
    }

    /// Number of loader calls so far.
    pub fn calls(&self) -> usize {
        lock(&self.gates).len()
    }

    /// Settle call number `call` (1-indexed). Returns `false` if that call
    /// does not exist or was already resolved.
    pub fn resolve(&self, call: usize, result: FetchResult<T>) -> bool {
        let sender = lock(&self.gates)
            .get_mut(call.wrapping_sub(1))
            .and_then(Option::take);
        match sender {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Client configuration pointing at a non-routable test host.
pub fn base_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "http://isobar.test".to_string(),
        ..ClientConfig::default()
    }
}

/// Availability response body.
pub fn availability_json(available: bool) -> Value {
    json!({ "available": available })
}

/// Summary response body with one populated series.
pub fn usable_summary_json() -> Value {
    json!({
        "series": [
            { "name": "t2m", "leadHours": [0, 6, 12], "values": [271.4, 272.0, null] }
        ]
    })
}

// ============================================================================
// GENERATORS
// ============================================================================

/// Non-zero search step in hours, either direction.
pub fn arb_shift_hours() -> impl Strategy<Value = i64> {
    prop_oneof![-48i64..=-1, 1i64..=48]
}

/// Cache key parameter, including separator and escape characters.
pub fn arb_key_param() -> impl Strategy<Value = String> {
    "[a-z0-9|\\\\-]{0,12}"
}

/// Usable-date step for a 12-step search.
pub fn arb_search_attempt() -> impl Strategy<Value = u32> {
    1u32..=12
}

// ============================================================================
// TESTS
// ============================================================================
