//! Cache-backed request consumer.
//!
//! Same generation discipline as [`ManagedRequest`](crate::ManagedRequest),
//! plus a shared [`RequestCache`]: a fresh entry for the current key is
//! served without loading, and successful loads are written back.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use isobar_core::{CacheKey, FetchResult};
use tracing::{debug, trace};

use crate::state::{lock, CachedOptions, CachedState, Cycle, Loader, Pending, Settled};
use crate::store::RequestCache;

pub struct CachedRequest<T, D> {
    loader: Loader<T, D>,
    cache: Arc<RequestCache>,
    shared: Arc<Mutex<CachedInner<T, D>>>,
}

struct CachedInner<T, D> {
    state: CachedState<T>,
    initial_data: T,
    enabled: bool,
    ttl: Option<Duration>,
    key: Option<CacheKey>,
    deps: D,
    generation: u64,
    /// Set by `refresh`; bypasses the cache until a load for the current
    /// generation settles.
    force_refresh: bool,
}

impl<T, D> CachedRequest<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    /// Create the consumer. A `None` key keeps it idle.
    pub fn new<F, Fut>(
        cache: Arc<RequestCache>,
        key: Option<CacheKey>,
        loader: F,
        deps: D,
        options: CachedOptions<T>,
    ) -> Self
    where
        F: Fn(&D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let loader: Loader<T, D> = Arc::new(move |deps: &D| loader(deps).boxed());
        Self {
            loader,
            cache,
            shared: Arc::new(Mutex::new(CachedInner {
                state: CachedState::idle(options.initial_data.clone()),
                initial_data: options.initial_data,
                enabled: options.enabled,
                ttl: options.ttl,
                key,
                deps,
                generation: 0,
                force_refresh: false,
            })),
        }
    }

    pub fn state(&self) -> CachedState<T> {
        lock(&self.shared).state.clone()
    }

    pub fn key(&self) -> Option<CacheKey> {
        lock(&self.shared).key.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    /// Run one cycle: serve a fresh entry, or start a load.
    pub fn evaluate(&self) -> Cycle {
        let mut inner = lock(&self.shared);
        if !inner.enabled {
            return Cycle::Skipped;
        }
        let Some(key) = inner.key.clone() else {
            return Cycle::Skipped;
        };

        // Any earlier load becomes stale, whether or not this cycle loads.
        inner.generation += 1;
        let generation = inner.generation;

        if !inner.force_refresh {
            if let Some(read) = self.cache.get::<T>(&key, inner.ttl) {
                debug!(key = %key, age_ms = read.age().as_millis() as u64, "Serving cached entry");
                inner.state.data = read.into_value();
                inner.state.from_cache = true;
                inner.state.loading = false;
                inner.state.error = None;
                return Cycle::Cached;
            }
        }

        debug!(key = %key, forced = inner.force_refresh, "Loading");
        inner.state.loading = true;
        inner.state.from_cache = false;
        inner.state.error = None;
        let load = (self.loader)(&inner.deps);
        drop(inner);

        let shared = Arc::clone(&self.shared);
        let cache = Arc::clone(&self.cache);
        let settle = async move {
            let result = load.await;
            let mut inner = lock(&shared);
            if inner.generation != generation {
                trace!(key = %key, generation, current = inner.generation, "Discarding stale result");
                return Settled::Discarded;
            }
            inner.force_refresh = false;
            inner.state.loading = false;
            match result {
                Ok(data) => {
                    cache.insert(&key, data.clone());
                    inner.state.data = data;
                    Settled::Applied
                }
                Err(err) => {
                    debug!(key = %key, error = %err, "Load failed; cache left untouched");
                    inner.state.data = inner.initial_data.clone();
                    inner.state.error = Some(err);
                    Settled::Failed
                }
            }
        };
        Cycle::Fetching(Pending::new(generation, settle.boxed()))
    }

    /// Replace key and dependencies; runs a cycle only if either changed.
    pub fn update(&self, key: Option<CacheKey>, deps: D) -> Cycle {
        {
            let mut inner = lock(&self.shared);
            if inner.key == key && inner.deps == deps {
                return Cycle::Skipped;
            }
            inner.key = key;
            inner.deps = deps;
        }
        self.evaluate()
    }

    pub fn set_enabled(&self, enabled: bool) -> Cycle {
        {
            let mut inner = lock(&self.shared);
            if inner.enabled == enabled {
                return Cycle::Skipped;
            }
            inner.enabled = enabled;
        }
        self.evaluate()
    }

    pub fn set_ttl(&self, ttl: Option<Duration>) -> Cycle {
        {
            let mut inner = lock(&self.shared);
            if inner.ttl == ttl {
                return Cycle::Skipped;
            }
            inner.ttl = ttl;
        }
        self.evaluate()
    }

    /// Bypass the cache for the next load, then run a cycle. Skipped, with
    /// nothing carried over, while disabled or keyless.
    pub fn refresh(&self) -> Cycle {
        {
            let mut inner = lock(&self.shared);
            if !inner.enabled || inner.key.is_none() {
                return Cycle::Skipped;
            }
            inner.force_refresh = true;
        }
        self.evaluate()
    }
}
