//! Tour catalog client: data model, error taxonomy and the HTTP fetcher.

pub mod api;
pub mod errors;
pub mod json;
pub mod models;
pub mod source;

pub use api::CatalogApi;
pub use errors::CatalogError;
pub use models::{
    Agency, FilterCriteria, GeoPoint, PageResult, RangeFilter, SortOrder, TourRecord,
};
pub use source::{CatalogSource, RetryPolicy};
