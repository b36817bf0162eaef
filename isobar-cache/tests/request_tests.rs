//! Consumer-level behaviour of managed and cached requests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use isobar_cache::{
    CachedOptions, CachedRequest, ManagedRequest, RequestCache, RequestOptions, Settled,
};
use isobar_core::{CacheKey, FetchResult};
use isobar_test_utils::{arb_key_param, unavailable_error, GatedLoader};
use proptest::prelude::*;

fn summary_key(workspace: &str, date: &str) -> CacheKey {
    CacheKey::builder("summary").param(workspace).param(date).build()
}

/// Loader returning `calls * 10`, counting invocations.
fn counting_loader(
    calls: &Arc<AtomicU32>,
) -> impl Fn(&String) -> futures_util::future::Ready<FetchResult<u32>> + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    move |_: &String| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        futures_util::future::ready(Ok(n * 10))
    }
}

// ============================================================================
// STALE RESPONSE PROTECTION
// ============================================================================

#[tokio::test]
async fn test_out_of_order_settle_keeps_latest() {
    let gates = GatedLoader::<&'static str>::new();
    let request = ManagedRequest::new(gates.loader::<u32>(), 1, RequestOptions::new("initial"));

    let first = request.evaluate().into_pending().unwrap();
    let second = request.update(2).into_pending().unwrap();
    assert_eq!(gates.calls(), 2);

    // Latest settles first, then the superseded one.
    gates.resolve(2, Ok("second"));
    assert_eq!(second.await, Settled::Applied);
    gates.resolve(1, Ok("first"));
    assert_eq!(first.await, Settled::Discarded);

    let state = request.state();
    assert_eq!(state.data, "second");
    assert!(!state.loading);
}

#[tokio::test]
async fn test_superseded_failure_is_discarded() {
    let gates = GatedLoader::<u32>::new();
    let request = ManagedRequest::new(gates.loader::<u32>(), 1, RequestOptions::new(0));

    let first = request.evaluate().into_pending().unwrap();
    let second = request.update(2).into_pending().unwrap();
    assert!(request.state().loading);

    gates.resolve(1, Err(unavailable_error()));
    assert_eq!(first.await, Settled::Discarded);
    assert!(request.state().loading);
    assert!(request.state().error.is_none());

    gates.resolve(2, Ok(7));
    assert_eq!(second.await, Settled::Applied);
    assert_eq!(request.state().data, 7);
}

#[tokio::test]
async fn test_cached_key_change_discards_previous_load() {
    let cache = RequestCache::shared();
    let gates = GatedLoader::<u32>::new();
    let request = CachedRequest::new(
        Arc::clone(&cache),
        Some(summary_key("ws-1", "2024011500")),
        gates.loader::<String>(),
        "2024011500".to_string(),
        CachedOptions::new(0),
    );

    let first = request.evaluate().into_pending().unwrap();
    let second = request
        .update(Some(summary_key("ws-1", "2024011506")), "2024011506".to_string())
        .into_pending()
        .unwrap();

    gates.resolve(1, Ok(100));
    assert_eq!(first.await, Settled::Discarded);
    // Discarded results never reach the store.
    assert!(!cache.contains(&summary_key("ws-1", "2024011500")));

    gates.resolve(2, Ok(200));
    assert_eq!(second.await, Settled::Applied);
    assert!(cache.contains(&summary_key("ws-1", "2024011506")));
    assert_eq!(request.state().data, 200);
}

#[tokio::test]
async fn test_cache_hit_supersedes_inflight_load() {
    let cache = RequestCache::shared();
    cache.insert(&summary_key("ws-1", "b"), 55u32);

    let gates = GatedLoader::<u32>::new();
    let request = CachedRequest::new(
        Arc::clone(&cache),
        Some(summary_key("ws-1", "a")),
        gates.loader::<String>(),
        "a".to_string(),
        CachedOptions::new(0),
    );

    let pending = request.evaluate().into_pending().unwrap();
    assert!(request
        .update(Some(summary_key("ws-1", "b")), "b".to_string())
        .is_cached());

    gates.resolve(1, Ok(11));
    assert_eq!(pending.await, Settled::Discarded);

    let state = request.state();
    assert_eq!(state.data, 55);
    assert!(state.from_cache);
}

// ============================================================================
// TTL
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fresh_entry_served_until_ttl_elapses() {
    let cache = RequestCache::shared();
    let calls = Arc::new(AtomicU32::new(0));
    let key = summary_key("ws-1", "2024011500");
    let ttl = Some(Duration::from_secs(60));

    let first = CachedRequest::new(
        Arc::clone(&cache),
        Some(key.clone()),
        counting_loader(&calls),
        "2024011500".to_string(),
        CachedOptions::new(0).ttl(ttl),
    );
    assert_eq!(first.evaluate().settle().await, Some(Settled::Applied));

    tokio::time::advance(Duration::from_secs(60)).await;
    let second = CachedRequest::new(
        Arc::clone(&cache),
        Some(key.clone()),
        counting_loader(&calls),
        "2024011500".to_string(),
        CachedOptions::new(0).ttl(ttl),
    );
    assert!(second.evaluate().is_cached());
    assert_eq!(second.state().data, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let third = CachedRequest::new(
        Arc::clone(&cache),
        Some(key),
        counting_loader(&calls),
        "2024011500".to_string(),
        CachedOptions::new(0).ttl(ttl),
    );
    let cycle = third.evaluate();
    assert!(cycle.is_fetching());
    assert!(third.state().loading);
    assert!(!third.state().from_cache);
    cycle.settle().await;

    assert_eq!(third.state().data, 20);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_ttl_change_reevaluates() {
    let cache = RequestCache::shared();
    let calls = Arc::new(AtomicU32::new(0));
    let request = CachedRequest::new(
        Arc::clone(&cache),
        Some(summary_key("ws-1", "x")),
        counting_loader(&calls),
        "x".to_string(),
        CachedOptions::new(0),
    );
    request.evaluate().settle().await;

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(request.set_ttl(None).is_skipped());
    let cycle = request.set_ttl(Some(Duration::from_secs(10)));
    assert!(cycle.is_fetching());
    cycle.settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// FAILURE AND INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_failed_refresh_keeps_cache_entry() {
    let cache = RequestCache::shared();
    let key = summary_key("ws-1", "x");
    cache.insert(&key, 42u32);

    let gates = GatedLoader::<u32>::new();
    let request = CachedRequest::new(
        Arc::clone(&cache),
        Some(key.clone()),
        gates.loader::<()>(),
        (),
        CachedOptions::new(0),
    );
    assert!(request.evaluate().is_cached());

    let pending = request.refresh().into_pending().unwrap();
    gates.resolve(1, Err(unavailable_error()));
    assert_eq!(pending.await, Settled::Failed);

    let state = request.state();
    assert_eq!(state.data, 0);
    assert_eq!(state.error.as_ref().and_then(|e| e.status()), Some(503));
    assert_eq!(
        cache.peek::<u32>(&key).map(|read| read.into_value()),
        Some(42)
    );

    // The forced attempt settled, so the next cycle serves the cache again.
    assert!(request.evaluate().is_cached());
    assert_eq!(request.state().data, 42);
    assert!(request.state().error.is_none());
}

#[tokio::test]
async fn test_prefix_invalidation_refetches_family() {
    let cache = RequestCache::shared();
    let calls = Arc::new(AtomicU32::new(0));

    let ws1 = CachedRequest::new(
        Arc::clone(&cache),
        Some(summary_key("ws-1", "x")),
        counting_loader(&calls),
        "x".to_string(),
        CachedOptions::new(0),
    );
    let ws2 = CachedRequest::new(
        Arc::clone(&cache),
        Some(summary_key("ws-2", "x")),
        counting_loader(&calls),
        "x".to_string(),
        CachedOptions::new(0),
    );
    ws1.evaluate().settle().await;
    ws2.evaluate().settle().await;

    let removed = cache.clear(Some(&CacheKey::prefix("summary", ["ws-1"])));
    assert_eq!(removed, 1);

    assert!(ws1.evaluate().is_fetching());
    assert!(ws2.evaluate().is_cached());
}

#[tokio::test]
async fn test_disabled_consumer_never_loads() {
    let cache = RequestCache::shared();
    let calls = Arc::new(AtomicU32::new(0));
    let request = CachedRequest::new(
        Arc::clone(&cache),
        Some(summary_key("ws-1", "x")),
        counting_loader(&calls),
        "x".to_string(),
        CachedOptions::new(0).enabled(false),
    );

    assert!(request.evaluate().is_skipped());
    assert!(request.refresh().is_skipped());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let cycle = request.set_enabled(true);
    assert!(cycle.is_fetching());
    cycle.settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_only_latest_cycle_lands(count in 2usize..8, order in proptest::collection::vec(any::<u8>(), 8)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let gates = GatedLoader::<usize>::new();
            let request = ManagedRequest::new(gates.loader::<usize>(), 0, RequestOptions::new(usize::MAX));

            let mut pending = vec![request.evaluate().into_pending().unwrap()];
            for deps in 1..count {
                pending.push(request.update(deps).into_pending().unwrap());
            }

            // Settle in a shuffled order.
            let mut indices: Vec<usize> = (0..count).collect();
            for (i, seed) in order.iter().enumerate().take(count) {
                let j = usize::from(*seed) % count;
                indices.swap(i, j);
            }
            let mut outcomes = vec![None; count];
            let mut slots: Vec<_> = pending.into_iter().map(Some).collect();
            for index in indices {
                gates.resolve(index + 1, Ok(index));
                let cycle = slots[index].take().unwrap();
                outcomes[index] = Some(cycle.await);
            }

            for (index, outcome) in outcomes.iter().enumerate() {
                let expected = if index == count - 1 { Settled::Applied } else { Settled::Discarded };
                assert_eq!(*outcome, Some(expected));
            }
            assert_eq!(request.state().data, count - 1);
        });
    }

    #[test]
    fn prop_workspace_clear_is_scoped(a in arb_key_param(), b in arb_key_param()) {
        prop_assume!(a != b);
        let cache = RequestCache::new();
        cache.insert(&summary_key(&a, "x"), 1u8);
        cache.insert(&summary_key(&b, "x"), 2u8);

        prop_assert_eq!(cache.clear(Some(&CacheKey::prefix("summary", [a.as_str()]))), 1);
        prop_assert!(!cache.contains(&summary_key(&a, "x")));
        prop_assert!(cache.contains(&summary_key(&b, "x")));
    }
}
