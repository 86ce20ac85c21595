//! Full-result-set aggregation over the paginated catalog.
//!
//! The catalog cannot filter by destination, duration or price, so those
//! views are computed client-side over every page for a query and order.
//! Page 1 reveals the page count; the remaining pages are fetched with
//! bounded concurrency and concatenated in page order.
//!
//! ## Known approximation
//!
//! At most `max_pages` pages are fetched. Larger result sets are truncated,
//! and pages that fail after page 1 are left out. Neither is hidden: both
//! show up in [`AggregatedResultSet::completeness`].

use crate::cache::key::{CacheKey, aggregate_key};
use crate::cache::store::{CacheStore, Fetched, TtlTier};
use crate::catalog::errors::CatalogError;
use crate::catalog::models::{FilterCriteria, PageResult, TourRecord};
use crate::catalog::source::{CatalogSource, RetryPolicy};
use crate::listing::session::FetchSession;
use crate::utils::fmt_duration;
use futures::{StreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default cap on pages fetched for one aggregate.
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Default number of page requests in flight during the fan-out.
pub const DEFAULT_CONCURRENCY: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResultSet {
    /// The catalog-side criteria the pages were fetched with.
    pub criteria: FilterCriteria,
    pub records: Vec<TourRecord>,
    /// Pages whose records made it into `records`.
    pub fetched_pages: u32,
    pub total_pages_at_source: u32,
    /// Pages within the cap that failed and were left out.
    pub failed_pages: Vec<u32>,
    pub page_cap: u32,
}

/// Whether an aggregate covers everything the source reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completeness {
    Complete,
    Incomplete {
        /// Pages that failed to load.
        missing_pages: Vec<u32>,
        /// Pages beyond the cap that were never requested.
        truncated_pages: u32,
    },
}

impl AggregatedResultSet {
    pub fn completeness(&self) -> Completeness {
        let truncated_pages = self.total_pages_at_source.saturating_sub(self.page_cap);
        if self.failed_pages.is_empty() && truncated_pages == 0 {
            Completeness::Complete
        } else {
            Completeness::Incomplete {
                missing_pages: self.failed_pages.clone(),
                truncated_pages,
            }
        }
    }
}

#[derive(Clone)]
pub struct AggregationCache {
    source: Arc<dyn CatalogSource>,
    store: CacheStore<Arc<AggregatedResultSet>>,
    max_pages: u32,
    concurrency: usize,
    retry: RetryPolicy,
}

impl AggregationCache {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: CacheStore<Arc<AggregatedResultSet>>,
        max_pages: u32,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            store,
            max_pages: max_pages.max(1),
            concurrency: concurrency.max(1),
            retry: RetryPolicy::INTERACTIVE,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Key of the aggregate `criteria` reads from.
    pub fn key(criteria: &FilterCriteria) -> CacheKey {
        aggregate_key(&criteria.aggregate_base())
    }

    /// Every record matching the catalog-side part of `criteria` (query,
    /// category, location, order), from cache or by fetching all pages up to
    /// the cap. Destination and range filters are ignored here.
    ///
    /// Fails when page 1 fails and no stale aggregate exists. Returns
    /// [`CatalogError::Cancelled`] without caching anything when `session`
    /// is superseded before the fan-out starts.
    pub async fn get_full_result_set(
        &self,
        criteria: &FilterCriteria,
        session: &FetchSession,
    ) -> Result<Fetched<Arc<AggregatedResultSet>>, CatalogError> {
        let base = criteria.aggregate_base();
        let key = aggregate_key(&base);

        self.store
            .get_or_fetch(&key, TtlTier::Aggregate, || async {
                self.aggregate(&base, session).await.map(Arc::new)
            })
            .await
    }

    /// Drop the cached aggregate `criteria` reads from.
    pub fn invalidate(&self, criteria: &FilterCriteria) -> bool {
        self.store.remove(&Self::key(criteria))
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    async fn aggregate(
        &self,
        base: &FilterCriteria,
        session: &FetchSession,
    ) -> Result<AggregatedResultSet, CatalogError> {
        let start = Instant::now();
        let first = self
            .retry
            .run("aggregate page 1", || self.source.fetch_page(base, 1))
            .await?;

        if session.is_cancelled() {
            debug!(generation = session.generation(), "aggregation superseded after page 1");
            return Err(CatalogError::Cancelled);
        }

        let total_pages = first.total_pages.max(1);
        let last_page = total_pages.min(self.max_pages);
        if total_pages > self.max_pages {
            warn!(
                total_pages,
                cap = self.max_pages,
                "aggregate truncated at page cap"
            );
        }

        let rest: Vec<(u32, Result<PageResult, CatalogError>)> = stream::iter(2..=last_page)
            .map(|page| async move {
                let result = self
                    .retry
                    .run("aggregate page", || self.source.fetch_page(base, page))
                    .await;
                (page, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut records = first.records;
        let mut fetched_pages = 1;
        let mut failed_pages = Vec::new();
        for (page, result) in rest {
            match result {
                Ok(page_result) => {
                    records.extend(page_result.records);
                    fetched_pages += 1;
                }
                Err(err) => {
                    warn!(page, error = %err, "aggregate page failed, omitting it");
                    failed_pages.push(page);
                }
            }
        }

        info!(
            query = base.query().unwrap_or_default(),
            category = base.category.as_deref().unwrap_or_default(),
            sort = %base.sort_order,
            records = records.len(),
            fetched_pages,
            total_pages,
            failed = failed_pages.len(),
            elapsed = fmt_duration(start.elapsed()),
            "aggregate built"
        );

        Ok(AggregatedResultSet {
            criteria: base.clone(),
            records,
            fetched_pages,
            total_pages_at_source: total_pages,
            failed_pages,
            page_cap: self.max_pages,
        })
    }
}
