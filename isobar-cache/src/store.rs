//! Process-wide request cache.
//!
//! One [`RequestCache`] is shared by every cached consumer. Entries are
//! type-erased so consumers of different payload types can share a store;
//! a read with the wrong type behaves like a miss.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use isobar_core::CacheKey;
use tokio::time::Instant;
use tracing::debug;

use crate::freshness::{is_fresh, CacheRead};

#[derive(Clone)]
struct CacheEntry {
    stored_at: Instant,
    data: Arc<dyn Any + Send + Sync>,
}

/// Counters for cache reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key -> timestamped payload map.
#[derive(Default)]
pub struct RequestCache {
    entries: DashMap<String, CacheEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh store behind an `Arc`, ready to hand to consumers.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Read a fresh entry.
    ///
    /// Returns `None` when the key is absent, the entry is older than
    /// `ttl`, or it holds a different type.
    pub fn get<T>(&self, key: &CacheKey, ttl: Option<Duration>) -> Option<CacheRead<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let read = self
            .peek::<T>(key)
            .filter(|read| is_fresh(read.cached_at(), ttl));
        match read {
            Some(read) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(read)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Read an entry regardless of age. Does not touch the counters.
    pub fn peek<T>(&self, key: &CacheKey) -> Option<CacheRead<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entry = self.entries.get(key.as_str())?;
        let value = entry.data.downcast_ref::<T>()?.clone();
        Some(CacheRead::new(value, entry.stored_at))
    }

    /// Store `data` under `key`, replacing any previous entry.
    pub fn insert<T>(&self, key: &CacheKey, data: T)
    where
        T: Send + Sync + 'static,
    {
        self.entries.insert(
            key.as_str().to_string(),
            CacheEntry {
                stored_at: Instant::now(),
                data: Arc::new(data),
            },
        );
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key.as_str()).is_some();
        if removed {
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    /// Remove every entry whose key starts with `prefix`, or every entry
    /// when `prefix` is `None`. Returns the number removed.
    pub fn clear(&self, prefix: Option<&str>) -> usize {
        let before = self.entries.len();
        match prefix {
            None => self.entries.clear(),
            Some(prefix) => self.entries.retain(|key, _| !key.starts_with(prefix)),
        }
        let removed = before.saturating_sub(self.entries.len());
        debug!(prefix = prefix.unwrap_or("*"), removed, "Cache cleared");
        removed
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key.as_str())
    }

    /// Keys currently stored under `prefix`, in no particular order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<CacheKey> {
        self.entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| CacheKey::from(entry.key().as_str()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entries.len() as u64,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
