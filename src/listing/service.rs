//! The listing service a consuming view talks to.
//!
//! Owns every cache, the aggregation layer, the parallel fetcher and the
//! session tracker for one view, and exposes the committed view state.

use crate::cache::aggregate::{AggregationCache, Completeness};
use crate::cache::key::{ResourceType, build_key, detail_key, key_prefix};
use crate::cache::monitor::{CacheMonitor, CacheStats};
use crate::cache::prefetch::{FetchOptions, ParallelFetcher};
use crate::cache::store::{CacheStore, Freshness, TtlPolicy, TtlTier};
use crate::catalog::errors::CatalogError;
use crate::catalog::models::{Agency, FilterCriteria, GeoPoint, PageResult, TourRecord};
use crate::catalog::source::{CatalogSource, RetryPolicy};
use crate::config::Config;
use crate::listing::pipeline::{DEFAULT_PAGE_SIZE, ListingMeta, render};
use crate::listing::session::{FetchSession, SessionTracker};
use crate::utils::log_if_slow;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ListingConfig {
    pub page_size: usize,
    pub max_parallel_requests: usize,
    pub related_categories: Vec<String>,
    pub user_location: Option<GeoPoint>,
    pub slow_load_threshold: Duration,
    pub ttl: TtlPolicy,
    pub capacity: usize,
    pub max_pages: u32,
    pub aggregate_concurrency: usize,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_parallel_requests: 3,
            related_categories: Vec::new(),
            user_location: None,
            slow_load_threshold: Duration::from_secs(2),
            ttl: TtlPolicy::default(),
            capacity: crate::cache::store::DEFAULT_CAPACITY,
            max_pages: crate::cache::aggregate::DEFAULT_MAX_PAGES,
            aggregate_concurrency: crate::cache::aggregate::DEFAULT_CONCURRENCY,
        }
    }
}

impl From<&Config> for ListingConfig {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size.max(1),
            max_parallel_requests: config.max_parallel_requests,
            related_categories: config.related_categories.clone(),
            user_location: config.user_location().ok().flatten(),
            slow_load_threshold: config.slow_load_threshold,
            ttl: TtlPolicy {
                static_ttl: config.ttl_static,
                listing: config.ttl_listing,
                detail: config.ttl_detail,
                search: config.ttl_search,
                aggregate: config.ttl_aggregate,
                max_age: config.cache_max_age,
            },
            capacity: config.cache_capacity,
            max_pages: config.max_pages,
            aggregate_concurrency: config.aggregate_concurrency,
        }
    }
}

/// What the view renders: the last committed load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingView {
    pub tours: Vec<TourRecord>,
    pub meta: ListingMeta,
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<String>,
    /// Served from an expired entry because the refetch failed.
    pub stale: bool,
    /// Set for client-side filtered views.
    pub completeness: Option<Completeness>,
}

fn new_store<V: Clone>(config: &ListingConfig, monitor: &Arc<CacheMonitor>) -> CacheStore<V> {
    CacheStore::new(config.ttl.clone(), config.capacity, Arc::clone(monitor))
}

struct Resolved {
    tours: Vec<TourRecord>,
    meta: ListingMeta,
    stale: bool,
    completeness: Option<Completeness>,
}

pub struct TourListing {
    source: Arc<dyn CatalogSource>,
    pages: CacheStore<PageResult>,
    details: CacheStore<TourRecord>,
    agencies: CacheStore<Agency>,
    aggregates: AggregationCache,
    fetcher: ParallelFetcher,
    sessions: SessionTracker,
    monitor: Arc<CacheMonitor>,
    state: RwLock<ListingView>,
    last_request: Mutex<Option<(FilterCriteria, u32)>>,
    config: ListingConfig,
}

impl TourListing {
    pub fn new(source: Arc<dyn CatalogSource>, config: ListingConfig) -> Self {
        let monitor = Arc::new(CacheMonitor::new());
        let pages: CacheStore<PageResult> = new_store(&config, &monitor);
        let aggregates = AggregationCache::new(
            Arc::clone(&source),
            new_store(&config, &monitor),
            config.max_pages,
            config.aggregate_concurrency,
        );
        let fetcher = ParallelFetcher::new(Arc::clone(&source), pages.clone());

        Self {
            source,
            pages,
            details: new_store(&config, &monitor),
            agencies: new_store(&config, &monitor),
            aggregates,
            fetcher,
            sessions: SessionTracker::new(),
            monitor,
            state: RwLock::new(ListingView {
                meta: ListingMeta {
                    per_page: config.page_size.max(1),
                    ..Default::default()
                },
                ..Default::default()
            }),
            last_request: Mutex::new(None),
            config,
        }
    }

    /// Load `page` of the listing for `criteria` and commit it to the view.
    ///
    /// Starting a load supersedes any load still in flight; whichever load
    /// started last owns the view. Returns the view as it stands afterwards.
    pub async fn load(&self, criteria: &FilterCriteria, page: u32) -> ListingView {
        let page = page.max(1);
        let session = self.sessions.begin();
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((criteria.clone(), page));
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
        }

        let start = Instant::now();
        let outcome = self.resolve(criteria, page, &session).await;
        log_if_slow(start, self.config.slow_load_threshold, "listing load");

        let mut state = self.state.write().await;
        session.commit(|| match outcome {
            Ok(resolved) => {
                *state = ListingView {
                    tours: resolved.tours,
                    meta: resolved.meta,
                    is_loading: false,
                    is_error: false,
                    error: None,
                    stale: resolved.stale,
                    completeness: resolved.completeness,
                };
            }
            Err(err) => {
                warn!(error = %err, page, "listing load failed");
                state.is_loading = false;
                state.is_error = true;
                state.error = Some(err.to_string());
            }
        });
        state.clone()
    }

    /// Re-run the last load from the top. Whatever is still cached is reused.
    pub async fn refresh(&self) -> ListingView {
        let last = self
            .last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match last {
            Some((criteria, page)) => self.load(&criteria, page).await,
            None => self.view().await,
        }
    }

    pub async fn view(&self) -> ListingView {
        self.state.read().await.clone()
    }

    /// Warm the caches for a likely next request without touching the view.
    pub async fn prefetch(&self, criteria: &FilterCriteria, page: u32) {
        let page = page.max(1);
        let retry = RetryPolicy::BACKGROUND;
        let result = if criteria.needs_client_side() {
            let aggregates = self.aggregates.clone().with_retry(retry);
            aggregates
                .get_full_result_set(criteria, &FetchSession::detached())
                .await
                .map(|_| ())
        } else {
            let key = build_key(ResourceType::Tours, criteria, page);
            self.pages
                .get_or_fetch(&key, TtlPolicy::tier_for(criteria, page), || {
                    retry.run("prefetch page", || self.source.fetch_page(criteria, page))
                })
                .await
                .map(|_| ())
        };

        match result {
            Ok(()) => debug!(page, "prefetch complete"),
            Err(err) => debug!(page, error = %err, "prefetch failed"),
        }
    }

    /// Drop cached data. `None` clears everything; `Some` drops every page
    /// cached for those criteria and the aggregate they would read from.
    pub fn invalidate(&self, criteria: Option<&FilterCriteria>) {
        match criteria {
            None => {
                self.pages.clear();
                self.details.clear();
                self.agencies.clear();
                self.aggregates.clear();
                info!("all listing caches cleared");
            }
            Some(criteria) => {
                let pages = self
                    .pages
                    .remove_prefix(&key_prefix(ResourceType::Tours, criteria));
                let aggregate = self.aggregates.invalidate(criteria);
                debug!(pages, aggregate, "listing cache invalidated");
            }
        }
    }

    pub async fn tour(&self, slug: &str) -> Result<TourRecord, CatalogError> {
        let key = detail_key(ResourceType::Tour, slug);
        let retry = RetryPolicy::INTERACTIVE;
        self.details
            .get_or_fetch(&key, TtlTier::Detail, || {
                retry.run("tour detail", || self.source.fetch_tour(slug))
            })
            .await
            .map(|fetched| fetched.value)
    }

    pub async fn agency(&self, id: u64) -> Result<Agency, CatalogError> {
        let key = detail_key(ResourceType::Agency, &id.to_string());
        let retry = RetryPolicy::INTERACTIVE;
        self.agencies
            .get_or_fetch(&key, TtlTier::Detail, || {
                retry.run("agency detail", || self.source.fetch_agency(id))
            })
            .await
            .map(|fetched| fetched.value)
    }

    pub fn stats(&self) -> CacheStats {
        self.monitor.snapshot()
    }

    async fn resolve(
        &self,
        criteria: &FilterCriteria,
        page: u32,
        session: &FetchSession,
    ) -> Result<Resolved, CatalogError> {
        if criteria.needs_client_side() {
            let fetched = self
                .aggregates
                .get_full_result_set(criteria, session)
                .await?;
            let rendered = render(&fetched.value, criteria, page, self.config.page_size);
            return Ok(Resolved {
                tours: rendered.records,
                meta: rendered.meta,
                stale: fetched.freshness == Freshness::Stale,
                completeness: Some(fetched.value.completeness()),
            });
        }

        let key = build_key(ResourceType::Tours, criteria, page);
        let tier = TtlPolicy::tier_for(criteria, page);
        let fetched = self
            .pages
            .get_or_fetch(&key, tier, || async {
                if page == 1 {
                    let options = FetchOptions {
                        max_parallel_requests: self.config.max_parallel_requests,
                        related_categories: self.config.related_categories.clone(),
                        user_location: self.config.user_location,
                        primary_retry: RetryPolicy::INTERACTIVE,
                    };
                    self.fetcher
                        .fetch_with_related(criteria, page, &options)
                        .await
                        .map(|fetch| fetch.primary)
                } else {
                    RetryPolicy::INTERACTIVE
                        .run("listing page", || self.source.fetch_page(criteria, page))
                        .await
                }
            })
            .await?;

        let meta = ListingMeta::from_source(&fetched.value, self.config.page_size);
        Ok(Resolved {
            tours: fetched.value.records,
            meta,
            stale: fetched.freshness == Freshness::Stale,
            completeness: None,
        })
    }
}
