//! Primary page fetch with speculative related fetches in parallel.
//!
//! While the primary request is in flight the network is mostly idle, so a
//! few likely next requests ride along: alternate categories for an
//! uncategorized first page, and a nearby-tours query when the user's
//! location is known. Their results only warm the cache; a failure among
//! them never affects the primary result.

use crate::cache::key::{ResourceType, build_key};
use crate::cache::store::{CacheStore, TtlPolicy};
use crate::catalog::errors::CatalogError;
use crate::catalog::models::{FilterCriteria, GeoPoint, PageResult};
use crate::catalog::source::{CatalogSource, RetryPolicy};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Label of the location-scoped speculative fetch.
pub const NEARBY_LABEL: &str = "nearby";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Upper bound on requests issued together, primary included.
    pub max_parallel_requests: usize,
    /// Categories worth warming when the primary request has none.
    pub related_categories: Vec<String>,
    pub user_location: Option<GeoPoint>,
    /// Applied to the primary request only.
    pub primary_retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_parallel_requests: 3,
            related_categories: Vec::new(),
            user_location: None,
            primary_retry: RetryPolicy::INTERACTIVE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchTiming {
    pub total_ms: u64,
    pub parallel_ms: u64,
    /// Rough serialized time avoided, `(N-1) * (parallel_ms / N)`.
    /// Diagnostic only.
    pub estimated_saved_ms: u64,
}

impl FetchTiming {
    fn new(total_ms: u64, parallel_ms: u64, requests: usize) -> Self {
        let n = requests.max(1) as u64;
        Self {
            total_ms,
            parallel_ms,
            estimated_saved_ms: (n - 1) * (parallel_ms / n),
        }
    }
}

#[derive(Debug)]
pub struct ParallelFetch {
    pub primary: PageResult,
    pub related: BTreeMap<String, Result<PageResult, CatalogError>>,
    pub timing: FetchTiming,
}

/// Speculative requests for `criteria`/`page`, at most `max_parallel - 1`.
pub fn plan_related(
    criteria: &FilterCriteria,
    page: u32,
    options: &FetchOptions,
) -> Vec<(String, FilterCriteria)> {
    let budget = options.max_parallel_requests.saturating_sub(1);
    let mut planned = Vec::new();

    if options.user_location.is_some() && criteria.query().is_none() && criteria.location.is_none()
    {
        planned.push((
            NEARBY_LABEL.to_string(),
            FilterCriteria {
                location: options.user_location,
                ..criteria.clone()
            },
        ));
    }

    if criteria.category.is_none() && page <= 1 {
        planned.extend(
            options
                .related_categories
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|category| {
                    (
                        format!("category:{category}"),
                        criteria.clone().with_category(category),
                    )
                }),
        );
    }

    planned.truncate(budget);
    planned
}

/// Issues the primary request alongside the planned speculative ones and
/// writes successful speculative pages into the shared page store.
#[derive(Clone)]
pub struct ParallelFetcher {
    source: Arc<dyn CatalogSource>,
    pages: CacheStore<PageResult>,
}

impl ParallelFetcher {
    pub fn new(source: Arc<dyn CatalogSource>, pages: CacheStore<PageResult>) -> Self {
        Self { source, pages }
    }

    pub async fn fetch_with_related(
        &self,
        criteria: &FilterCriteria,
        page: u32,
        options: &FetchOptions,
    ) -> Result<ParallelFetch, CatalogError> {
        let planned = plan_related(criteria, page, options);
        let requests = planned.len() + 1;
        let start = Instant::now();

        let primary = options
            .primary_retry
            .run("primary page", || self.source.fetch_page(criteria, page));
        let related = join_all(planned.iter().map(|(label, related_criteria)| async move {
            let result = self.source.fetch_page(related_criteria, 1).await;
            (label, related_criteria, result)
        }));
        let (primary, related) = tokio::join!(primary, related);
        let parallel_ms = elapsed_ms(start);

        let mut outcomes = BTreeMap::new();
        for (label, related_criteria, result) in related {
            match &result {
                Ok(page_result) => {
                    let key = build_key(ResourceType::Tours, related_criteria, 1);
                    let tier = TtlPolicy::tier_for(related_criteria, 1);
                    self.pages.set(key, page_result.clone(), tier);
                    trace!(label = label.as_str(), "speculative page cached");
                }
                Err(err) => {
                    debug!(label = label.as_str(), error = %err, "speculative fetch failed");
                }
            }
            outcomes.insert(label.clone(), result);
        }

        let primary = primary?;
        let timing = FetchTiming::new(elapsed_ms(start), parallel_ms, requests);
        debug!(
            requests,
            parallel_ms = timing.parallel_ms,
            estimated_saved_ms = timing.estimated_saved_ms,
            "parallel fetch complete"
        );

        Ok(ParallelFetch {
            primary,
            related: outcomes,
            timing,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::monitor::CacheMonitor;
    use crate::catalog::models::{Agency, TourRecord};
    use async_trait::async_trait;
    use std::time::Duration;

    const LATENCY: Duration = Duration::from_millis(100);

    /// Answers every page after a fixed latency. Category-scoped requests
    /// fail when `fail_categories` is set.
    struct SlowCatalog {
        fail_categories: bool,
    }

    #[async_trait]
    impl CatalogSource for SlowCatalog {
        async fn fetch_page(
            &self,
            criteria: &FilterCriteria,
            page: u32,
        ) -> Result<PageResult, CatalogError> {
            tokio::time::sleep(LATENCY).await;
            if self.fail_categories && criteria.category.is_some() {
                return Err(CatalogError::Upstream {
                    status: 503,
                    url: "http://catalog/tours".into(),
                });
            }
            Ok(PageResult {
                records: Vec::new(),
                current_page: page,
                total_pages: 1,
                total_count: 0,
                per_page: Some(10),
            })
        }

        async fn fetch_tour(&self, slug: &str) -> Result<TourRecord, CatalogError> {
            Err(CatalogError::Upstream {
                status: 404,
                url: format!("http://catalog/tours/{slug}"),
            })
        }

        async fn fetch_agency(&self, id: u64) -> Result<Agency, CatalogError> {
            Err(CatalogError::Upstream {
                status: 404,
                url: format!("http://catalog/agencies/{id}"),
            })
        }
    }

    fn fetcher(fail_categories: bool) -> (ParallelFetcher, CacheStore<PageResult>) {
        let pages = CacheStore::new(TtlPolicy::default(), 100, Arc::new(CacheMonitor::new()));
        let source: Arc<dyn CatalogSource> = Arc::new(SlowCatalog { fail_categories });
        (ParallelFetcher::new(source, pages.clone()), pages)
    }

    fn two_categories() -> FetchOptions {
        FetchOptions {
            max_parallel_requests: 3,
            related_categories: vec!["a".into(), "b".into()],
            user_location: None,
            primary_retry: RetryPolicy::BACKGROUND,
        }
    }

    fn options(max: usize) -> FetchOptions {
        FetchOptions {
            max_parallel_requests: max,
            related_categories: vec!["safari".into(), "hiking".into(), "beach".into()],
            user_location: Some(GeoPoint {
                lat: -1.29,
                lng: 36.82,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn plan_respects_the_request_budget() {
        let plan = plan_related(&FilterCriteria::default(), 1, &options(3));
        let labels: Vec<&str> = plan.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec![NEARBY_LABEL, "category:safari"]);

        assert!(plan_related(&FilterCriteria::default(), 1, &options(1)).is_empty());
    }

    #[test]
    fn no_category_alternates_past_the_first_page() {
        let plan = plan_related(&FilterCriteria::default(), 2, &options(5));
        let labels: Vec<&str> = plan.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec![NEARBY_LABEL]);
    }

    #[test]
    fn text_queries_skip_the_nearby_fetch() {
        let criteria = FilterCriteria::default().with_query("gorilla");
        let plan = plan_related(&criteria, 1, &options(5));
        assert!(plan.iter().all(|(label, _)| label != NEARBY_LABEL));
        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|(_, c)| c.query() == Some("gorilla")));
    }

    #[test]
    fn categorized_primary_plans_nothing_without_location() {
        let criteria = FilterCriteria::default().with_category("safari");
        let opts = FetchOptions {
            user_location: None,
            ..options(5)
        };
        assert!(plan_related(&criteria, 1, &opts).is_empty());
    }

    #[test]
    fn saved_time_estimate() {
        let timing = FetchTiming::new(130, 120, 3);
        assert_eq!(timing.estimated_saved_ms, 80);
        assert_eq!(FetchTiming::new(50, 40, 1).estimated_saved_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn related_failures_leave_the_primary_intact() {
        let (fetcher, pages) = fetcher(true);
        let fetch = fetcher
            .fetch_with_related(&FilterCriteria::default(), 1, &two_categories())
            .await
            .unwrap();

        assert_eq!(fetch.primary.current_page, 1);
        let labels: Vec<&str> = fetch.related.keys().map(String::as_str).collect();
        assert_eq!(labels, vec!["category:a", "category:b"]);
        assert!(fetch.related.values().all(|result| result.is_err()));
        // Failed speculative pages are not cached.
        assert!(pages.is_empty());

        // All three requests ran side by side, not one after another.
        let timing = fetch.timing;
        assert!(timing.parallel_ms >= LATENCY.as_millis() as u64);
        assert!(timing.parallel_ms < 3 * LATENCY.as_millis() as u64);
        assert!(timing.total_ms >= timing.parallel_ms);
        assert_eq!(timing.estimated_saved_ms, 2 * (timing.parallel_ms / 3));
    }

    #[tokio::test(start_paused = true)]
    async fn related_successes_warm_the_page_store() {
        let (fetcher, pages) = fetcher(false);
        let fetch = fetcher
            .fetch_with_related(&FilterCriteria::default(), 1, &two_categories())
            .await
            .unwrap();
        assert!(fetch.related.values().all(|result| result.is_ok()));

        for category in ["a", "b"] {
            let criteria = FilterCriteria::default().with_category(category);
            let key = build_key(ResourceType::Tours, &criteria, 1);
            assert!(pages.get(&key).is_some(), "{category} was not cached");
        }
        // The primary is left to the caller's own cache write.
        let primary = build_key(ResourceType::Tours, &FilterCriteria::default(), 1);
        assert!(pages.get(&primary).is_none());
    }
}
