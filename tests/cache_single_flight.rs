mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedFetcher, high, low, sequence};
use scroll_sequence::cache::ImageCache;
use scroll_sequence::catalog::{Catalog, Tier};
use scroll_sequence::error::LoadError;

fn cache_with(fetcher: Arc<ScriptedFetcher>, frames: u32) -> Arc<ImageCache> {
    let catalog = Catalog::from_config(&sequence(frames)).unwrap();
    Arc::new(ImageCache::new(Arc::new(catalog), fetcher))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_fetches_share_one_transport_call() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(50)));
    let cache = cache_with(Arc::clone(&fetcher), 4);

    let (a, b) = tokio::join!(
        cache.fetch(Tier::Low, 2, false),
        cache.fetch(Tier::Low, 2, false)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(fetcher.calls(), 1);
    assert!(Arc::ptr_eq(&a, &b), "both callers observe the same image");
    assert_eq!(cache.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_failures_are_shared_and_leave_no_entry() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(30)).failing(&low(1)));
    let cache = cache_with(Arc::clone(&fetcher), 4);

    let (a, b) = tokio::join!(
        cache.fetch(Tier::Low, 1, false),
        cache.fetch(Tier::Low, 1, false)
    );
    assert!(matches!(a, Err(LoadError::Fetch { index: 1, .. })));
    assert!(matches!(b, Err(LoadError::Fetch { index: 1, .. })));
    assert_eq!(fetcher.calls(), 1);
    assert!(cache.get(Tier::Low, 1).is_none());

    // a later attempt goes back to the transport
    fetcher.heal(&low(1));
    let image = cache.fetch(Tier::Low, 1, false).await.unwrap();
    assert_eq!(image.url, low(1));
    assert_eq!(fetcher.calls_for(&low(1)), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cached_entries_are_stable() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(5)));
    let cache = cache_with(Arc::clone(&fetcher), 4);

    let fetched = cache.fetch(Tier::High, 3, false).await.unwrap();
    let first = cache.get(Tier::High, 3).unwrap();
    let again = cache.fetch(Tier::High, 3, false).await.unwrap();
    assert!(Arc::ptr_eq(&fetched, &first));
    assert!(Arc::ptr_eq(&first, &again));
    assert!(Arc::ptr_eq(&first, &cache.get(Tier::High, 3).unwrap()));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first.url, high(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tiers_are_cached_independently() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(5)));
    let cache = cache_with(Arc::clone(&fetcher), 4);

    cache.fetch(Tier::Low, 0, false).await.unwrap();
    assert!(cache.get(Tier::High, 0).is_none());
    cache.fetch(Tier::High, 0, false).await.unwrap();

    assert_eq!(cache.loaded_count(Tier::Low), 1);
    assert_eq!(cache.loaded_count(Tier::High), 1);
    assert_eq!(fetcher.calls_for(&low(0)), 1);
    assert_eq!(fetcher.calls_for(&high(0)), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fail_if_loaded_reports_existing_entries() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(5)));
    let cache = cache_with(Arc::clone(&fetcher), 4);

    cache.fetch(Tier::Low, 0, true).await.unwrap();
    let err = cache.fetch(Tier::Low, 0, true).await.unwrap_err();
    assert!(err.is_already_loaded());
    assert!(matches!(err, LoadError::AlreadyLoaded { tier: Tier::Low, index: 0 }));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn out_of_range_indices_fail_without_fetching() {
    let fetcher = Arc::new(ScriptedFetcher::new(Duration::from_millis(5)));
    let cache = cache_with(Arc::clone(&fetcher), 4);

    let err = cache.fetch(Tier::Low, 4, false).await.unwrap_err();
    assert!(matches!(err, LoadError::OutOfRange { index: 4, len: 4 }));
    assert_eq!(fetcher.calls(), 0);
}
