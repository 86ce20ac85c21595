//! HTTP client for the remote tour catalog.

use crate::catalog::errors::CatalogError;
use crate::catalog::json::parse_json_with_context;
use crate::catalog::models::{
    Agency, DetailEnvelope, FilterCriteria, PageEnvelope, PageResult, TourRecord,
};
use crate::catalog::source::CatalogSource;
use crate::utils::fmt_duration;
use anyhow::Context;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use url::Url;

/// Client for the catalog's `tours` and `agencies` endpoints.
///
/// Each call is a single request: no retries, no caching. Both belong to
/// the layers above.
pub struct CatalogApi {
    http: reqwest::Client,
    base_url: Url,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl CatalogApi {
    /// Build a client rooted at `base_url` (e.g. `https://api.example.com/v1/`).
    ///
    /// `requests_per_second` caps outbound traffic across every clone of the
    /// client; `None` disables the cap.
    pub fn new(
        mut base_url: Url,
        timeout: Duration,
        requests_per_second: Option<NonZeroU32>,
    ) -> anyhow::Result<Self> {
        // Without the trailing slash `Url::join` would replace the last segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(8)
            .user_agent(concat!("tourcat/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build catalog HTTP client")?;

        let limiter =
            requests_per_second.map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            http,
            base_url,
            limiter,
        })
    }

    /// `GET tours?query=&category=&order=&location[lat]=&location[lng]=&page=N`
    pub fn listing_url(&self, criteria: &FilterCriteria, page: u32) -> Url {
        let mut url = self.endpoint("tours");
        {
            let mut query = url.query_pairs_mut();
            if let Some(text) = criteria.query() {
                query.append_pair("query", text);
            }
            if let Some(category) = criteria.category.as_deref().filter(|c| !c.is_empty()) {
                query.append_pair("category", category);
            }
            query.append_pair("order", criteria.sort_order.as_str());
            if let Some(location) = criteria.location {
                query.append_pair("location[lat]", &location.lat.to_string());
                query.append_pair("location[lng]", &location.lng.to_string());
            }
            query.append_pair("page", &page.max(1).to_string());
        }
        url
    }

    pub fn tour_url(&self, slug: &str) -> Url {
        self.endpoint(&format!("tours/{}", urlencoding::encode(slug)))
    }

    pub fn agency_url(&self, id: u64) -> Url {
        self.endpoint(&format!("agencies/{id}"))
    }

    fn endpoint(&self, path: &str) -> Url {
        // `path` is always relative and percent-encoded, so joining cannot fail
        // for a base that already parsed.
        self.base_url
            .join(path)
            .unwrap_or_else(|_| self.base_url.clone())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let start = Instant::now();
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CatalogError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "catalog returned an error status");
            return Err(CatalogError::Upstream {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::network(url.as_str(), e))?;

        trace!(
            url = %url,
            bytes = body.len(),
            elapsed = fmt_duration(start.elapsed()),
            "catalog response received"
        );

        parse_json_with_context(&body).map_err(|source| CatalogError::Parse {
            status: status.as_u16(),
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl CatalogSource for CatalogApi {
    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        page: u32,
    ) -> Result<PageResult, CatalogError> {
        let envelope: PageEnvelope = self.get_json(self.listing_url(criteria, page)).await?;
        Ok(envelope.into())
    }

    async fn fetch_tour(&self, slug: &str) -> Result<TourRecord, CatalogError> {
        let envelope: DetailEnvelope<TourRecord> = self.get_json(self.tour_url(slug)).await?;
        Ok(envelope.data)
    }

    async fn fetch_agency(&self, id: u64) -> Result<Agency, CatalogError> {
        let envelope: DetailEnvelope<Agency> = self.get_json(self.agency_url(id)).await?;
        Ok(envelope.data)
    }
}
