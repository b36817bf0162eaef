//! Dependency-driven request with stale-response protection.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use isobar_core::FetchResult;
use tracing::trace;

use crate::state::{lock, Cycle, Loader, Pending, RequestOptions, RequestState, Settled};

/// Runs a loader whenever its dependencies change and exposes
/// `{data, loading, error}`.
///
/// Every started load takes a new generation token. A load that settles
/// after a newer one has started is discarded, so state only ever reflects
/// the latest cycle.
pub struct ManagedRequest<T, D> {
    loader: Loader<T, D>,
    shared: Arc<Mutex<ManagedInner<T, D>>>,
}

struct ManagedInner<T, D> {
    state: RequestState<T>,
    initial_data: T,
    enabled: bool,
    deps: D,
    generation: u64,
}

impl<T, D> ManagedRequest<T, D>
where
    T: Clone + Send + 'static,
    D: Clone + PartialEq + Send + 'static,
{
    /// Create the request. No load starts until [`evaluate`](Self::evaluate).
    pub fn new<F, Fut>(loader: F, deps: D, options: RequestOptions<T>) -> Self
    where
        F: Fn(&D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let loader: Loader<T, D> = Arc::new(move |deps: &D| loader(deps).boxed());
        Self {
            loader,
            shared: Arc::new(Mutex::new(ManagedInner {
                state: RequestState::idle(options.initial_data.clone()),
                initial_data: options.initial_data,
                enabled: options.enabled,
                deps,
                generation: 0,
            })),
        }
    }

    /// Current `{data, loading, error}`.
    pub fn state(&self) -> RequestState<T> {
        lock(&self.shared).state.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.shared).enabled
    }

    /// Run one cycle with the current dependencies.
    pub fn evaluate(&self) -> Cycle {
        let (generation, load) = {
            let mut inner = lock(&self.shared);
            if !inner.enabled {
                return Cycle::Skipped;
            }
            inner.generation += 1;
            inner.state.loading = true;
            inner.state.error = None;
            (inner.generation, (self.loader)(&inner.deps))
        };

        let shared = Arc::clone(&self.shared);
        let settle = async move {
            let result = load.await;
            let mut inner = lock(&shared);
            if inner.generation != generation {
                trace!(generation, current = inner.generation, "Discarding stale result");
                return Settled::Discarded;
            }
            inner.state.loading = false;
            match result {
                Ok(data) => {
                    inner.state.data = data;
                    Settled::Applied
                }
                Err(err) => {
                    inner.state.data = inner.initial_data.clone();
                    inner.state.error = Some(err);
                    Settled::Failed
                }
            }
        };
        Cycle::Fetching(Pending::new(generation, settle.boxed()))
    }

    /// Replace the dependencies; runs a cycle only if they changed.
    pub fn update(&self, deps: D) -> Cycle {
        {
            let mut inner = lock(&self.shared);
            if inner.deps == deps {
                return Cycle::Skipped;
            }
            inner.deps = deps;
        }
        self.evaluate()
    }

    /// Toggle the request; runs a cycle only if the flag changed.
    ///
    /// Disabling does not cancel a load already in flight.
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

    /// Force a new cycle with unchanged dependencies.
    pub fn refresh(&self) -> Cycle {
        self.evaluate()
    }
}
