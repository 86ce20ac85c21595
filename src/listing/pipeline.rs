//! Client-side filter, sort and paginate over an aggregated result set.
//!
//! Deterministic and side-effect free. Filtering works on borrowed records;
//! only the page slice that is finally returned gets cloned.

use crate::cache::aggregate::AggregatedResultSet;
use crate::catalog::models::{FilterCriteria, PageResult, SortOrder, TourRecord};
use crate::listing::countries::country_name;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

pub const DEFAULT_PAGE_SIZE: usize = 12;

/// Pagination metadata of a rendered listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingMeta {
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: usize,
    pub total: u64,
    /// 1-based index of the first record on the page; `None` when empty.
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl Default for ListingMeta {
    fn default() -> Self {
        Self {
            current_page: 1,
            last_page: 1,
            per_page: DEFAULT_PAGE_SIZE,
            total: 0,
            from: None,
            to: None,
        }
    }
}

impl ListingMeta {
    /// Meta for a page served as-is by the catalog.
    pub fn from_source(page: &PageResult, fallback_page_size: usize) -> Self {
        let per_page = page
            .per_page
            .map(|p| p as usize)
            .unwrap_or(fallback_page_size)
            .max(1);
        let current_page = page.current_page.max(1);
        let offset = u64::from(current_page - 1) * per_page as u64;
        let (from, to) = window(offset, page.records.len());
        Self {
            current_page,
            last_page: page.total_pages.max(1),
            per_page,
            total: page.total_count,
            from,
            to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedPage {
    pub records: Vec<TourRecord>,
    pub meta: ListingMeta,
}

/// Filter `aggregate` by the client-side parts of `criteria`, sort it, and
/// cut out `page` (1-based) of `page_size` records.
///
/// `last_page` comes from the filtered count, not the source's pagination.
pub fn render(
    aggregate: &AggregatedResultSet,
    criteria: &FilterCriteria,
    page: u32,
    page_size: usize,
) -> RenderedPage {
    let destinations = normalized_destinations(&criteria.destinations);

    let mut matched: Vec<&TourRecord> = aggregate
        .records
        .iter()
        .filter(|record| {
            destinations.is_empty()
                || destinations
                    .iter()
                    .any(|destination| matches_destination(record, destination))
        })
        .filter(|record| criteria.duration.admits(record.duration))
        .filter(|record| criteria.price.admits(record.price))
        .collect();

    sort_records(&mut matched, criteria.sort_order);
    paginate(&matched, page, page_size)
}

fn normalized_destinations(destinations: &BTreeSet<String>) -> Vec<String> {
    destinations
        .iter()
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether `record` is in `destination`.
///
/// The catalog encodes geography inconsistently, so several strategies are
/// tried in order and the first hit wins:
///
/// 1. the record's country code names the destination (`UG` → "Uganda")
/// 2. the destination's first two letters equal the country code
/// 3. the record's city contains the destination, case-insensitively
/// 4. a tag contains the destination or the destination contains a tag
///
/// Strategy 2 only applies to codes missing from the name table, or to a
/// destination that is the bare code. Otherwise "Zambia" would hit `ZA`
/// (South Africa) and "South Africa" would hit `SO` (Somalia).
pub fn matches_destination(record: &TourRecord, destination: &str) -> bool {
    let destination = destination.trim().to_lowercase();
    if destination.is_empty() {
        return false;
    }

    if let Some(code) = record
        .country_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        match country_name(code) {
            Some(name) if name.to_lowercase() == destination => return true,
            Some(_) => {
                if destination.eq_ignore_ascii_case(code) {
                    return true;
                }
            }
            None => {
                if destination
                    .get(..2)
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(code))
                {
                    return true;
                }
            }
        }
    }

    if record
        .city
        .as_deref()
        .is_some_and(|city| city.to_lowercase().contains(&destination))
    {
        return true;
    }

    record.tags.iter().any(|tag| {
        let tag = tag.trim().to_lowercase();
        !tag.is_empty() && (tag.contains(&destination) || destination.contains(&tag))
    })
}

/// Stable sort, so records with equal keys keep their source order.
pub fn sort_records(records: &mut [&TourRecord], order: SortOrder) {
    match order {
        SortOrder::Latest => records.sort_by(|a, b| missing_last(a.created_at, b.created_at, true)),
        SortOrder::Oldest => {
            records.sort_by(|a, b| missing_last(a.created_at, b.created_at, false))
        }
        SortOrder::PriceAsc => records.sort_by(|a, b| float_missing_last(a.price, b.price, false)),
        SortOrder::PriceDesc => records.sort_by(|a, b| float_missing_last(a.price, b.price, true)),
        SortOrder::NameAsc => records.sort_by_cached_key(|r| r.name.to_lowercase()),
        SortOrder::NameDesc => {
            records.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()))
        }
        SortOrder::DurationAsc => {
            records.sort_by(|a, b| missing_last(a.duration, b.duration, false))
        }
        SortOrder::DurationDesc => {
            records.sort_by(|a, b| missing_last(a.duration, b.duration, true))
        }
        SortOrder::Popular => {
            records.sort_by(|a, b| missing_last(a.popularity, b.popularity, true))
        }
    }
}

/// Order by `a`/`b`, descending if asked, with missing values after present ones.
fn missing_last<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn float_missing_last(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) if descending => b.total_cmp(&a),
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn paginate(records: &[&TourRecord], page: u32, page_size: usize) -> RenderedPage {
    let page_size = page_size.max(1);
    let current_page = page.max(1);
    let total = records.len();
    let last_page = u32::try_from(total.div_ceil(page_size))
        .unwrap_or(u32::MAX)
        .max(1);

    let offset = (current_page as usize - 1).saturating_mul(page_size);
    let slice: Vec<TourRecord> = records
        .iter()
        .skip(offset)
        .take(page_size)
        .map(|record| (*record).clone())
        .collect();
    let (from, to) = window(offset as u64, slice.len());

    RenderedPage {
        records: slice,
        meta: ListingMeta {
            current_page,
            last_page,
            per_page: page_size,
            total: total as u64,
            from,
            to,
        },
    }
}

fn window(offset: u64, len: usize) -> (Option<u64>, Option<u64>) {
    if len == 0 {
        (None, None)
    } else {
        (Some(offset + 1), Some(offset + len as u64))
    }
}
