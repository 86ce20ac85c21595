//! Passive hit/miss/latency counters for cache diagnostics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters bumped by the cache stores. Reading them never changes behavior.
#[derive(Debug, Default)]
pub struct CacheMonitor {
    hits: AtomicU64,
    misses: AtomicU64,
    total_latency_ms: AtomicU64,
    request_count: AtomicU64,
}

impl CacheMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one upstream request made on behalf of a cache miss.
    pub(crate) fn record_request(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.total_latency_ms.fetch_add(ms, Ordering::Relaxed);
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            request_count: self.request_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total_latency_ms: u64,
    pub request_count: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0.0 before any lookups.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }

    /// Mean upstream latency in milliseconds, or 0.0 before any requests.
    pub fn average_latency_ms(&self) -> f64 {
        if self.request_count == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.request_count as f64
    }
}
