//! Catalog data model: filter criteria, tour records and page results.

use chrono::{DateTime, Utc};
use custom_debug_derive::Debug as CustomDebug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Listing order, both as sent to the catalog and as applied client-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Latest,
    Oldest,
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
    DurationAsc,
    DurationDesc,
    Popular,
}

impl SortOrder {
    pub const ALL: [SortOrder; 9] = [
        Self::Latest,
        Self::Oldest,
        Self::PriceAsc,
        Self::PriceDesc,
        Self::NameAsc,
        Self::NameDesc,
        Self::DurationAsc,
        Self::DurationDesc,
        Self::Popular,
    ];

    /// Wire value of the catalog's `order` parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Oldest => "oldest",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::DurationAsc => "duration_asc",
            Self::DurationDesc => "duration_desc",
            Self::Popular => "popular",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|order| order.as_str() == wanted)
            .ok_or_else(|| format!("unknown sort order '{s}'"))
    }
}

/// A latitude/longitude pair, used for nearby-tour queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// An inclusive numeric range that only filters when `enabled` is set.
///
/// UI state usually keeps default bounds populated even when the user never
/// touched the slider, so the bounds alone say nothing about intent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter<T> {
    pub enabled: bool,
    pub min: T,
    pub max: T,
}

impl<T: Copy + PartialOrd> RangeFilter<T> {
    pub fn between(min: T, max: T) -> Self {
        Self {
            enabled: true,
            min,
            max,
        }
    }

    /// Whether `value` passes. A disabled range passes everything; an enabled
    /// range rejects records that do not carry the value at all.
    pub fn admits(&self, value: Option<T>) -> bool {
        if !self.enabled {
            return true;
        }
        value.is_some_and(|v| v >= self.min && v <= self.max)
    }
}

impl<T: Default> Default for RangeFilter<T> {
    fn default() -> Self {
        Self {
            enabled: false,
            min: T::default(),
            max: T::default(),
        }
    }
}

/// One snapshot of the listing filter state.
///
/// `text_query`, `category`, `location` and `sort_order` are understood by the
/// catalog service. `destinations` and the ranges are applied client-side over
/// an aggregated result set.
#[derive(CustomDebug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[debug(skip_if = Option::is_none)]
    pub text_query: Option<String>,
    #[debug(skip_if = Option::is_none)]
    pub category: Option<String>,
    pub destinations: BTreeSet<String>,
    pub duration: RangeFilter<u32>,
    pub price: RangeFilter<f64>,
    pub sort_order: SortOrder,
    #[debug(skip_if = Option::is_none)]
    pub location: Option<GeoPoint>,
}

impl FilterCriteria {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.text_query = Some(query.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destinations.insert(destination.into());
        self
    }

    pub fn with_sort(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// The free-text query with surrounding whitespace removed; blank is none.
    pub fn query(&self) -> Option<&str> {
        self.text_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Whether the request is a search (free-text or geolocated) as opposed to
    /// a catalog-wide listing.
    pub fn is_search(&self) -> bool {
        self.query().is_some() || self.location.is_some()
    }

    /// Whether any dimension the catalog cannot filter on is active.
    pub fn needs_client_side(&self) -> bool {
        self.destinations.iter().any(|d| !d.trim().is_empty())
            || self.duration.enabled
            || self.price.enabled
    }

    /// The criteria sent upstream when aggregating: everything the catalog
    /// filters on itself, without the client-side dimensions.
    pub fn aggregate_base(&self) -> FilterCriteria {
        FilterCriteria {
            text_query: self.query().map(str::to_string),
            category: self
                .category
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            sort_order: self.sort_order,
            location: self.location,
            ..Default::default()
        }
    }
}

/// A tour as returned by the catalog. Only the fields used for filtering and
/// sorting are typed; everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourRecord {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    #[serde(default, alias = "title")]
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default, alias = "days")]
    pub duration: Option<u32>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "package_tags")]
    pub tags: Vec<String>,
    #[serde(default, alias = "views")]
    pub popularity: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Pagination block of a catalog listing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub total: u64,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// `{ data: [...], meta: {...} }` as returned by `GET tours`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageEnvelope {
    pub data: Vec<TourRecord>,
    pub meta: SourceMeta,
}

/// `{ data: {...} }` as returned by single-record endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailEnvelope<T> {
    pub data: T,
}

/// One page of one listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub records: Vec<TourRecord>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub per_page: Option<u32>,
}

impl From<PageEnvelope> for PageResult {
    fn from(envelope: PageEnvelope) -> Self {
        Self {
            records: envelope.data,
            current_page: envelope.meta.current_page,
            total_pages: envelope.meta.last_page,
            total_count: envelope.meta.total,
            per_page: envelope.meta.per_page,
        }
    }
}
