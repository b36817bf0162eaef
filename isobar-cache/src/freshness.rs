//! Freshness of cached reads.
//!
//! A TTL of `None` means an entry never goes stale on its own; only
//! explicit invalidation removes it.

use std::time::Duration;

use tokio::time::Instant;

/// Whether an entry written at `cached_at` is still fresh under `ttl`.
///
/// The boundary is inclusive: an entry exactly `ttl` old is fresh.
pub fn is_fresh(cached_at: Instant, ttl: Option<Duration>) -> bool {
    match ttl {
        None => true,
        Some(ttl) => Instant::now().saturating_duration_since(cached_at) <= ttl,
    }
}

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: Instant,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, cached_at: Instant) -> Self {
        Self { value, cached_at }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// When this value was stored.
    pub fn cached_at(&self) -> Instant {
        self.cached_at
    }

    /// How long ago the value was stored.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.cached_at)
    }

    /// Check freshness against `ttl` as of now.
    pub fn is_fresh(&self, ttl: Option<Duration>) -> bool {
        is_fresh(self.cached_at, ttl)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
