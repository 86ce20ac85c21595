//! The narrow contract the caching layer consumes, plus caller-side retry.

use crate::catalog::errors::CatalogError;
use crate::catalog::models::{Agency, FilterCriteria, PageResult, TourRecord};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Anything that can answer catalog queries: the HTTP client in production,
/// in-memory fakes in tests.
///
/// Implementations must not retry internally; see [`RetryPolicy`].
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch one page of the tour listing matching the catalog-native parts of
    /// `criteria` (query, category, order, location).
    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        page: u32,
    ) -> Result<PageResult, CatalogError>;

    async fn fetch_tour(&self, slug: &str) -> Result<TourRecord, CatalogError>;

    async fn fetch_agency(&self, id: u64) -> Result<Agency, CatalogError>;
}

/// How many times a caller reissues a retriable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Wait before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Someone is waiting on the result.
    pub const INTERACTIVE: RetryPolicy = RetryPolicy {
        max_retries: 1,
        backoff: Duration::from_millis(250),
    };

    /// Prefetch and cache warming; a miss here only costs a future cache hit.
    pub const BACKGROUND: RetryPolicy = RetryPolicy {
        max_retries: 0,
        backoff: Duration::ZERO,
    };

    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, CatalogError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(label, attempt, error = %err, "retrying catalog request");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> CatalogError {
        CatalogError::Upstream {
            status: 503,
            url: "http://catalog/tours".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interactive_retries_once_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::INTERACTIVE
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(unavailable())
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn background_never_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::BACKGROUND
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::INTERACTIVE
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CatalogError::Upstream {
                    status: 404,
                    url: "http://catalog/tours/missing".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(CatalogError::Upstream { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
