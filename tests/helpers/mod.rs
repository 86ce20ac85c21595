#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tourcat::catalog::{Agency, CatalogError, CatalogSource, FilterCriteria, PageResult, TourRecord};

/// One request seen by [`FakeCatalog::fetch_page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: Option<String>,
    pub category: Option<String>,
    pub page: u32,
}

/// In-memory catalog. Records are registered per text query (`""` for the
/// unfiltered listing); a category narrows them to records tagged with it.
#[derive(Default)]
pub struct FakeCatalog {
    per_page: usize,
    listings: Mutex<HashMap<String, Vec<TourRecord>>>,
    agencies: Mutex<HashMap<u64, Agency>>,
    failing_pages: Mutex<HashSet<u32>>,
    delays: Mutex<HashMap<String, Duration>>,
    page_requests: Mutex<Vec<PageRequest>>,
    detail_requests: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new(per_page: usize) -> Self {
        Self {
            per_page: per_page.max(1),
            ..Default::default()
        }
    }

    pub fn with_listing(self, query: &str, records: Vec<TourRecord>) -> Self {
        self.set_listing(query, records);
        self
    }

    pub fn with_agency(self, agency: Agency) -> Self {
        self.agencies.lock().unwrap().insert(agency.id, agency);
        self
    }

    pub fn set_listing(&self, query: &str, records: Vec<TourRecord>) {
        self.listings
            .lock()
            .unwrap()
            .insert(query.to_string(), records);
    }

    /// Every request for `page` fails with a 503 until [`Self::heal`].
    pub fn fail_page(&self, page: u32) {
        self.failing_pages.lock().unwrap().insert(page);
    }

    pub fn heal(&self) {
        self.failing_pages.lock().unwrap().clear();
    }

    /// Delay every request for `query` by `delay`.
    pub fn delay_query(&self, query: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
    }

    pub fn page_requests(&self) -> Vec<PageRequest> {
        self.page_requests.lock().unwrap().clone()
    }

    pub fn page_calls(&self) -> usize {
        self.page_requests.lock().unwrap().len()
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_requests.lock().unwrap().len()
    }

    fn matching(&self, criteria: &FilterCriteria) -> Vec<TourRecord> {
        let query = criteria.query().unwrap_or_default();
        let records = self
            .listings
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default();
        match criteria.category.as_deref() {
            Some(category) => records
                .into_iter()
                .filter(|r| r.tags.iter().any(|t| t.eq_ignore_ascii_case(category)))
                .collect(),
            None => records,
        }
    }
}

fn unavailable(url: String) -> CatalogError {
    CatalogError::Upstream { status: 503, url }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        page: u32,
    ) -> Result<PageResult, CatalogError> {
        let page = page.max(1);
        self.page_requests.lock().unwrap().push(PageRequest {
            query: criteria.query().map(str::to_string),
            category: criteria.category.clone(),
            page,
        });

        let delay = self
            .delays
            .lock()
            .unwrap()
            .get(criteria.query().unwrap_or_default())
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_pages.lock().unwrap().contains(&page) {
            return Err(unavailable(format!("fake://tours?page={page}")));
        }

        let records = self.matching(criteria);
        let total_pages = records.len().div_ceil(self.per_page).max(1) as u32;
        let page_records = records
            .iter()
            .skip((page as usize - 1) * self.per_page)
            .take(self.per_page)
            .cloned()
            .collect();

        Ok(PageResult {
            records: page_records,
            current_page: page,
            total_pages,
            total_count: records.len() as u64,
            per_page: Some(self.per_page as u32),
        })
    }

    async fn fetch_tour(&self, slug: &str) -> Result<TourRecord, CatalogError> {
        self.detail_requests.lock().unwrap().push(slug.to_string());
        self.listings
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find(|r| r.slug == slug)
            .cloned()
            .ok_or(CatalogError::Upstream {
                status: 404,
                url: format!("fake://tours/{slug}"),
            })
    }

    async fn fetch_agency(&self, id: u64) -> Result<Agency, CatalogError> {
        self.detail_requests.lock().unwrap().push(format!("agency:{id}"));
        self.agencies
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CatalogError::Upstream {
                status: 404,
                url: format!("fake://agencies/{id}"),
            })
    }
}

/// A tour with the fields destination matching looks at.
pub fn make_tour(id: u64, name: &str, country_code: Option<&str>, city: Option<&str>) -> TourRecord {
    TourRecord {
        id,
        slug: format!("tour-{id}"),
        name: name.to_string(),
        price: Some(100.0 * id as f64),
        duration: Some((id % 10) as u32 + 1),
        country_code: country_code.map(str::to_string),
        city: city.map(str::to_string),
        tags: Vec::new(),
        popularity: Some(id),
        created_at: None,
        extra: Default::default(),
    }
}

/// `count` numbered tours with ids starting at `first_id`.
pub fn numbered_tours(first_id: u64, count: u64) -> Vec<TourRecord> {
    (first_id..first_id + count)
        .map(|id| make_tour(id, &format!("Tour {id}"), Some("TZ"), Some("Arusha")))
        .collect()
}
