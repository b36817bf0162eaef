//! ISOBAR resilient fetch layer.
//!
//! Every outbound call made by the dashboard core goes through
//! [`ResilientClient::request`]: up to four attempts with exponential
//! backoff on network failures and transient 5xx statuses, and a single
//! shared operation for concurrent calls to the same endpoint.

pub mod client;
pub mod retry;
pub mod transport;

pub use client::ResilientClient;
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Transport, TransportResponse};
