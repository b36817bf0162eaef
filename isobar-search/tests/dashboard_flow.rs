//! Session date changes flowing into cached dashboard consumers.

use std::sync::Arc;

use isobar_cache::{CachedOptions, CachedRequest, RequestCache, Settled};
use isobar_core::{CacheKey, FetchResult};
use isobar_fetch::ResilientClient;
use isobar_search::{
    summary_endpoint, AggregateSummary, DateContext, DateSession, ForecastApi, SearchOutcome,
    SearchSettings, SummaryBaseline,
};
use isobar_test_utils::{
    availability_json, scripted_client, usable_summary_json, ScriptedReply, ScriptedTransport,
};

fn summary_key(context: &DateContext) -> Option<CacheKey> {
    let workspace = context.workspace.as_deref()?;
    let date = context.active_date.as_deref()?;
    Some(CacheKey::builder("summary").param(workspace).param(date).param("p50").build())
}

fn summary_loader(
    client: ResilientClient,
) -> impl Fn(&DateContext) -> futures_util::future::BoxFuture<'static, FetchResult<AggregateSummary>>
       + Send
       + Sync
       + 'static {
    use futures_util::FutureExt;
    move |context: &DateContext| {
        let client = client.clone();
        let endpoint = summary_endpoint(
            context.workspace.as_deref().unwrap_or_default(),
            context.active_date.as_deref().unwrap_or_default(),
            &SummaryBaseline::default(),
        );
        async move { client.request_json::<AggregateSummary>(&endpoint).await }.boxed()
    }
}

#[tokio::test(start_paused = true)]
async fn test_committed_date_rekeys_summary_consumer() {
    let transport = ScriptedTransport::from_fn(|endpoint, _| {
        if endpoint.contains("/availability") {
            ScriptedReply::Json(availability_json(endpoint.contains("date=2024-01-15T06")))
        } else {
            ScriptedReply::Json(usable_summary_json())
        }
    })
    .shared();
    let client = scripted_client(&transport);

    let session = DateSession::new(ForecastApi::new(client.clone()), SearchSettings::default());
    session.switch_workspace("ws-1", Some("2024-01-15T00:00:00Z".to_string()));
    let mut contexts = session.subscribe();

    let cache = RequestCache::shared();
    let initial = contexts.borrow_and_update().clone();
    let consumer = CachedRequest::new(
        Arc::clone(&cache),
        summary_key(&initial),
        summary_loader(client.clone()),
        initial,
        CachedOptions::new(AggregateSummary::default()),
    );
    assert_eq!(consumer.evaluate().settle().await, Some(Settled::Applied));
    assert!(consumer.state().data.is_usable());

    assert!(matches!(
        session.shift_forecast_base_date(6).await,
        SearchOutcome::Committed(_)
    ));

    assert!(contexts.has_changed().unwrap());
    let next = contexts.borrow_and_update().clone();
    let cycle = consumer.update(summary_key(&next), next);
    assert!(cycle.is_fetching());
    cycle.settle().await;

    let key = consumer.key().unwrap();
    assert!(key.as_str().contains("2024-01-15T06:00:00Z"));
    assert!(cache.contains(&key));
    assert_eq!(cache.len(), 2);

    // Back to the first date: served from the store, no new summary call.
    let calls_before = transport.call_count();
    session.select_date("2024-01-15T00:00:00Z");
    let back = contexts.borrow_and_update().clone();
    assert!(consumer.update(summary_key(&back), back).is_cached());
    assert!(consumer.state().from_cache);
    assert_eq!(transport.call_count(), calls_before);
}

#[tokio::test]
async fn test_workspace_switch_invalidates_family() {
    let cache = RequestCache::shared();
    for (workspace, date) in [("ws-1", "a"), ("ws-1", "b"), ("ws-2", "a")] {
        let context = DateContext {
            workspace: Some(workspace.to_string()),
            active_date: Some(date.to_string()),
            reset_epoch: 0,
        };
        cache.insert(&summary_key(&context).unwrap(), AggregateSummary::default());
    }

    let removed = cache.clear(Some(&CacheKey::prefix("summary", ["ws-1"])));
    assert_eq!(removed, 2);
    assert_eq!(cache.keys_with_prefix("summary|").len(), 1);
}
