mod helpers;

use helpers::{FakeCatalog, numbered_tours};
use std::sync::Arc;
use tourcat::cache::{
    AggregationCache, CacheMonitor, CacheStore, Completeness, Freshness, TtlPolicy,
};
use tourcat::catalog::{CatalogError, CatalogSource, FilterCriteria, SortOrder};
use tourcat::listing::{FetchSession, SessionTracker};

fn aggregation(fake: &Arc<FakeCatalog>, max_pages: u32) -> AggregationCache {
    let source: Arc<dyn CatalogSource> = fake.clone();
    let store = CacheStore::new(TtlPolicy::default(), 100, Arc::new(CacheMonitor::new()));
    AggregationCache::new(source, store, max_pages, 4)
}

#[tokio::test(start_paused = true)]
async fn fetches_every_page_in_order() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", numbered_tours(1, 35)));
    let cache = aggregation(&fake, 20);

    let fetched = cache
        .get_full_result_set(&FilterCriteria::default(), &FetchSession::detached())
        .await
        .unwrap();
    let set = fetched.value;

    assert_eq!(fetched.freshness, Freshness::Fetched);
    assert_eq!(set.total_pages_at_source, 4);
    assert_eq!(set.fetched_pages, 4);
    let ids: Vec<u64> = set.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, (1..=35).collect::<Vec<_>>());
    assert_eq!(set.completeness(), Completeness::Complete);
}

#[tokio::test(start_paused = true)]
async fn page_cap_bounds_the_fetch_and_reports_truncation() {
    let fake = Arc::new(FakeCatalog::new(2).with_listing("", numbered_tours(1, 50)));
    let cache = aggregation(&fake, 20);

    let set = cache
        .get_full_result_set(&FilterCriteria::default(), &FetchSession::detached())
        .await
        .unwrap()
        .value;

    assert_eq!(fake.page_calls(), 20);
    assert!(set.fetched_pages <= 20);
    assert_eq!(set.records.len(), 40);
    assert_eq!(set.total_pages_at_source, 25);
    assert_eq!(
        set.completeness(),
        Completeness::Incomplete {
            missing_pages: vec![],
            truncated_pages: 5,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn failed_later_pages_are_omitted_and_listed() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", numbered_tours(1, 40)));
    fake.fail_page(3);
    let cache = aggregation(&fake, 20);

    let set = cache
        .get_full_result_set(&FilterCriteria::default(), &FetchSession::detached())
        .await
        .unwrap()
        .value;

    assert_eq!(set.failed_pages, vec![3]);
    assert_eq!(set.fetched_pages, 3);
    let ids: Vec<u64> = set.records.iter().map(|r| r.id).collect();
    let expected: Vec<u64> = (1..=20).chain(31..=40).collect();
    assert_eq!(ids, expected);
    assert!(matches!(
        set.completeness(),
        Completeness::Incomplete { ref missing_pages, truncated_pages: 0 } if missing_pages == &[3]
    ));
}

#[tokio::test(start_paused = true)]
async fn first_page_failure_fails_and_caches_nothing() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", numbered_tours(1, 15)));
    fake.fail_page(1);
    let cache = aggregation(&fake, 20);

    let result = cache
        .get_full_result_set(&FilterCriteria::default(), &FetchSession::detached())
        .await;
    assert!(matches!(result, Err(CatalogError::Upstream { status: 503, .. })));

    fake.heal();
    let calls_before = fake.page_calls();
    let set = cache
        .get_full_result_set(&FilterCriteria::default(), &FetchSession::detached())
        .await
        .unwrap();
    assert_eq!(set.freshness, Freshness::Fetched);
    assert_eq!(fake.page_calls(), calls_before + 2);
}

#[tokio::test(start_paused = true)]
async fn second_request_is_served_from_cache() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("safari", numbered_tours(1, 25)));
    let cache = aggregation(&fake, 20);

    cache
        .get_full_result_set(
            &FilterCriteria::default()
                .with_query("safari")
                .with_sort(SortOrder::PriceAsc),
            &FetchSession::detached(),
        )
        .await
        .unwrap();
    let calls = fake.page_calls();

    // Surrounding whitespace does not change the key.
    let again = cache
        .get_full_result_set(
            &FilterCriteria::default()
                .with_query(" safari ")
                .with_sort(SortOrder::PriceAsc),
            &FetchSession::detached(),
        )
        .await
        .unwrap();
    assert_eq!(again.freshness, Freshness::Hit);
    assert_eq!(fake.page_calls(), calls);

    // A different order is a different aggregate.
    cache
        .get_full_result_set(
            &FilterCriteria::default()
                .with_query("safari")
                .with_sort(SortOrder::PriceDesc),
            &FetchSession::detached(),
        )
        .await
        .unwrap();
    assert_eq!(fake.page_calls(), calls * 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_aggregation() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", numbered_tours(1, 30)));
    fake.delay_query("", std::time::Duration::from_millis(200));
    let cache = aggregation(&fake, 20);
    let session = FetchSession::detached();

    let criteria_a = FilterCriteria::default();
    let criteria_b = FilterCriteria::default();
    let (a, b) = tokio::join!(
        cache.get_full_result_set(&criteria_a, &session),
        cache.get_full_result_set(&criteria_b, &session),
    );
    assert_eq!(a.unwrap().value.records.len(), 30);
    assert_eq!(b.unwrap().value.records.len(), 30);
    assert_eq!(fake.page_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn superseded_session_stops_after_first_page() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", numbered_tours(1, 50)));
    let cache = aggregation(&fake, 20);
    let tracker = SessionTracker::new();
    let old = tracker.begin();
    tracker.begin();

    let result = cache
        .get_full_result_set(&FilterCriteria::default(), &old)
        .await;
    assert!(matches!(result, Err(CatalogError::Cancelled)));
    assert_eq!(fake.page_calls(), 1);

    // Nothing partial was cached: the next caller builds the full set.
    let set = cache
        .get_full_result_set(&FilterCriteria::default(), &FetchSession::detached())
        .await
        .unwrap();
    assert_eq!(set.freshness, Freshness::Fetched);
    assert_eq!(set.value.records.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_a_rebuild() {
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", numbered_tours(1, 10)));
    let cache = aggregation(&fake, 20);
    let session = FetchSession::detached();

    cache
        .get_full_result_set(&FilterCriteria::default(), &session)
        .await
        .unwrap();
    assert!(cache.invalidate(&FilterCriteria::default()));
    assert!(!cache.invalidate(&FilterCriteria::default()));

    fake.set_listing("", numbered_tours(1, 12));
    let rebuilt = cache
        .get_full_result_set(&FilterCriteria::default(), &session)
        .await
        .unwrap();
    assert_eq!(rebuilt.value.records.len(), 12);
}

#[tokio::test(start_paused = true)]
async fn catalog_side_filters_are_sent_upstream_and_keyed() {
    let mut records = numbered_tours(1, 12);
    for tour in records.iter_mut().take(4) {
        tour.tags = vec!["safari".into()];
    }
    let fake = Arc::new(FakeCatalog::new(10).with_listing("", records));
    let cache = aggregation(&fake, 20);
    let session = FetchSession::detached();

    let safari = FilterCriteria::default()
        .with_category("safari")
        .with_destination("Tanzania");
    let set = cache.get_full_result_set(&safari, &session).await.unwrap();
    assert_eq!(set.value.records.len(), 4);
    assert_eq!(set.value.criteria.category.as_deref(), Some("safari"));
    assert!(set.value.criteria.destinations.is_empty());
    assert!(
        fake.page_requests()
            .iter()
            .all(|r| r.category.as_deref() == Some("safari"))
    );

    let everything = cache
        .get_full_result_set(&FilterCriteria::default(), &session)
        .await
        .unwrap();
    assert_eq!(everything.freshness, Freshness::Fetched);
    assert_eq!(everything.value.records.len(), 12);

    assert!(cache.invalidate(&safari.clone().with_destination("Kenya")));
    assert!(!cache.invalidate(&safari));
}
