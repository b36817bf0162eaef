//! Observable request state and the plumbing shared by request consumers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::BoxFuture;
use isobar_core::{CacheConfig, FetchError, FetchResult};

/// Type-erased loader: dependencies in, pending fetch out.
pub(crate) type Loader<T, D> = Arc<dyn Fn(&D) -> BoxFuture<'static, FetchResult<T>> + Send + Sync>;

/// Snapshot of a managed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestState<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<FetchError>,
}

impl<T> RequestState<T> {
    pub(crate) fn idle(data: T) -> Self {
        Self {
            data,
            loading: false,
            error: None,
        }
    }
}

/// Snapshot of a cached request.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedState<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<FetchError>,
    /// `true` when `data` was served from the store rather than fetched by
    /// this consumer.
    pub from_cache: bool,
}

impl<T> CachedState<T> {
    pub(crate) fn idle(data: T) -> Self {
        Self {
            data,
            loading: false,
            error: None,
            from_cache: false,
        }
    }
}

/// Construction options for a [`ManagedRequest`](crate::ManagedRequest).
#[derive(Debug, Clone)]
pub struct RequestOptions<T> {
    pub enabled: bool,
    /// Value of `data` before the first load and after any failure.
    pub initial_data: T,
}

impl<T> RequestOptions<T> {
    pub fn new(initial_data: T) -> Self {
        Self {
            enabled: true,
            initial_data,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

impl<T: Default> Default for RequestOptions<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Construction options for a [`CachedRequest`](crate::CachedRequest).
#[derive(Debug, Clone)]
pub struct CachedOptions<T> {
    pub enabled: bool,
    pub initial_data: T,
    /// Maximum age of a usable cache entry. `None` never expires.
    pub ttl: Option<Duration>,
}

impl<T> CachedOptions<T> {
    pub fn new(initial_data: T) -> Self {
        Self {
            enabled: true,
            initial_data,
            ttl: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Options carrying the configured default TTL.
    pub fn from_config(initial_data: T, config: &CacheConfig) -> Self {
        Self::new(initial_data).ttl(config.default_ttl())
    }
}

impl<T: Default> Default for CachedOptions<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// What an evaluation cycle did.
pub enum Cycle {
    /// Disabled, keyless, or nothing changed.
    Skipped,
    /// Served synchronously from the cache.
    Cached,
    /// A load was started. Poll the [`Pending`] to drive it.
    Fetching(Pending),
}

impl Cycle {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached)
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self, Self::Fetching(_))
    }

    pub fn into_pending(self) -> Option<Pending> {
        match self {
            Self::Fetching(pending) => Some(pending),
            _ => None,
        }
    }

    /// Drive the load to completion, if one was started.
    pub async fn settle(self) -> Option<Settled> {
        match self {
            Self::Fetching(pending) => Some(pending.await),
            _ => None,
        }
    }
}

impl fmt::Debug for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => f.write_str("Skipped"),
            Self::Cached => f.write_str("Cached"),
            Self::Fetching(pending) => f.debug_tuple("Fetching").field(pending).finish(),
        }
    }
}

/// How a load ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// Result written to state.
    Applied,
    /// Error written to state.
    Failed,
    /// A newer cycle started first; the result was dropped.
    Discarded,
}

/// An in-progress load.
///
/// Nothing happens until this is polled. Dropping it abandons the load and
/// leaves `loading` set until the next cycle.
pub struct Pending {
    generation: u64,
    future: BoxFuture<'static, Settled>,
}

impl Pending {
    pub(crate) fn new(generation: u64, future: BoxFuture<'static, Settled>) -> Self {
        Self { generation, future }
    }

    /// Generation token this load was started under.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Future for Pending {
    type Output = Settled;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Settled> {
        self.future.as_mut().poll(cx)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Lock that survives a panicked holder; request state stays readable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[test]
    fn test_options_builders() {
        let options = CachedOptions::new(0u32)
            .enabled(false)
            .ttl(Some(Duration::from_secs(5)));
        assert!(!options.enabled);
        assert_eq!(options.ttl, Some(Duration::from_secs(5)));

        let config = CacheConfig {
            default_ttl_ms: Some(1_500),
        };
        let options = CachedOptions::from_config("", &config);
        assert!(options.enabled);
        assert_eq!(options.ttl, Some(Duration::from_millis(1_500)));

        let options: RequestOptions<Vec<u8>> = RequestOptions::default();
        assert!(options.enabled);
        assert!(options.initial_data.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_settle() {
        assert_eq!(Cycle::Skipped.settle().await, None);
        assert_eq!(Cycle::Cached.settle().await, None);

        let pending = Pending::new(3, async { Settled::Applied }.boxed());
        assert_eq!(pending.generation(), 3);
        assert_eq!(Cycle::Fetching(pending).settle().await, Some(Settled::Applied));
    }
}
