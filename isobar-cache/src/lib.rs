//! ISOBAR request cache and request consumers.
//!
//! [`ManagedRequest`] reruns a loader when its dependencies change and
//! never lets a superseded load overwrite newer state. [`CachedRequest`]
//! adds a process-wide [`RequestCache`] with optional TTL so independent
//! consumers of the same key share one result.

pub mod cached;
pub mod freshness;
pub mod managed;
pub mod state;
pub mod store;

pub use cached::CachedRequest;
pub use freshness::CacheRead;
pub use managed::ManagedRequest;
pub use state::{CachedOptions, CachedState, Cycle, Pending, RequestOptions, RequestState, Settled};
pub use store::{CacheStats, RequestCache};
