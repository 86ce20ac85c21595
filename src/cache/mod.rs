//! Caching layer: keyed TTL store, key derivation, parallel prefetch and
//! full-result-set aggregation.

pub mod aggregate;
pub mod key;
pub mod monitor;
pub mod prefetch;
pub mod store;

pub use aggregate::{AggregatedResultSet, AggregationCache, Completeness};
pub use key::{CacheKey, ResourceType};
pub use monitor::{CacheMonitor, CacheStats};
pub use prefetch::{FetchOptions, ParallelFetch, ParallelFetcher};
pub use store::{CacheStore, Freshness, TtlPolicy, TtlTier};
