//! Deterministic cache keys for catalog requests.
//!
//! Layout: `resource|q=..|cat=..|dest=..|dur=..|price=..|loc=..|sort=..|page=N`.
//! Fields always appear in this order regardless of how the criteria were
//! built, every value is percent-encoded so user input cannot inject a
//! separator, and the destination set is normalized and sorted.

use crate::catalog::models::{FilterCriteria, GeoPoint, RangeFilter};
use std::collections::BTreeSet;
use std::fmt::{self, Write};

/// What a key points at. Part of every key, so equal criteria for different
/// resources never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// A page of the tour listing.
    Tours,
    /// The concatenation of every listing page for a query and order.
    TourAggregate,
    /// A single tour by slug.
    Tour,
    /// A single agency by id.
    Agency,
}

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tours => "tours",
            Self::TourAggregate => "tours-all",
            Self::Tour => "tour",
            Self::Agency => "agency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key for one page of `resource` under `criteria`.
pub fn build_key(resource: ResourceType, criteria: &FilterCriteria, page: u32) -> CacheKey {
    let CacheKey(mut key) = key_prefix(resource, criteria);
    let _ = write!(key, "page={}", page.max(1));
    CacheKey(key)
}

/// Everything in [`build_key`] except the page: a prefix shared by every page
/// of the same logical listing, used for invalidation.
pub fn key_prefix(resource: ResourceType, criteria: &FilterCriteria) -> CacheKey {
    let mut key = String::with_capacity(96);
    key.push_str(resource.as_str());
    push_field(&mut key, "q", criteria.query().unwrap_or_default());
    push_field(
        &mut key,
        "cat",
        criteria.category.as_deref().map(str::trim).unwrap_or_default(),
    );
    push_field(&mut key, "dest", &canonical_destinations(&criteria.destinations));
    push_field(&mut key, "dur", &range_token(&criteria.duration));
    push_field(&mut key, "price", &range_token(&criteria.price));
    push_field(&mut key, "loc", &location_token(criteria.location));
    push_field(&mut key, "sort", criteria.sort_order.as_str());
    key.push('|');
    CacheKey(key)
}

/// Key for an aggregated result set: the catalog-side filters only.
/// Destination and range filters are applied client-side over the same base
/// data, so they are not part of it.
pub fn aggregate_key(criteria: &FilterCriteria) -> CacheKey {
    let mut key = String::from(ResourceType::TourAggregate.as_str());
    push_field(&mut key, "q", criteria.query().unwrap_or_default());
    push_field(
        &mut key,
        "cat",
        criteria.category.as_deref().map(str::trim).unwrap_or_default(),
    );
    push_field(&mut key, "loc", &location_token(criteria.location));
    push_field(&mut key, "sort", criteria.sort_order.as_str());
    CacheKey(key)
}

/// Key for a single-record lookup.
pub fn detail_key(resource: ResourceType, id: &str) -> CacheKey {
    let mut key = String::from(resource.as_str());
    push_field(&mut key, "id", id.trim());
    CacheKey(key)
}

fn location_token(location: Option<GeoPoint>) -> String {
    location
        .map(|p| format!("{},{}", p.lat, p.lng))
        .unwrap_or_default()
}

fn push_field(key: &mut String, name: &str, value: &str) {
    key.push('|');
    key.push_str(name);
    key.push('=');
    key.push_str(&urlencoding::encode(value));
}

/// Trimmed, case-folded, deduplicated, sorted, then comma-joined. Each item is
/// encoded on its own so a comma inside a destination stays distinguishable.
fn canonical_destinations(destinations: &BTreeSet<String>) -> String {
    let normalized: BTreeSet<String> = destinations
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    normalized
        .iter()
        .map(|d| urlencoding::encode(d).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

/// A disabled range filters nothing, so it shares a key with no range at all.
fn range_token<T: fmt::Display>(range: &RangeFilter<T>) -> String {
    if range.enabled {
        format!("{}..{}", range.min, range.max)
    } else {
        String::new()
    }
}
