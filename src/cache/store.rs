//! Time-keyed cache store with TTL tiers and stale fallback.
//!
//! Entries are fresh while younger than their tier's TTL. Stale entries stay
//! around until they pass the hard `max_age` ceiling (or capacity pressure
//! pushes them out) so that a failed refetch can still serve the last good
//! value. Concurrent misses on one key share a single upstream fetch.

use crate::cache::key::CacheKey;
use crate::cache::monitor::CacheMonitor;
use crate::catalog::errors::CatalogError;
use crate::catalog::models::FilterCriteria;
use crate::utils::fmt_duration;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cache lifetime class, chosen from the shape of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlTier {
    /// First page of the unfiltered catalog. Changes rarely.
    Static,
    /// Any other catalog page without a query or location.
    Listing,
    /// A single tour or agency.
    Detail,
    /// Free-text or geolocated results. Relevance decays fast.
    Search,
    /// Full aggregated result sets.
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub static_ttl: Duration,
    pub listing: Duration,
    pub detail: Duration,
    pub search: Duration,
    pub aggregate: Duration,
    /// Hard ceiling: entries older than this are never served, even as a
    /// stale fallback.
    pub max_age: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            static_ttl: Duration::from_secs(30 * 60),
            listing: Duration::from_secs(10 * 60),
            detail: Duration::from_secs(5 * 60),
            search: Duration::from_secs(2 * 60),
            aggregate: Duration::from_secs(5 * 60),
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

impl TtlPolicy {
    pub fn ttl(&self, tier: TtlTier) -> Duration {
        match tier {
            TtlTier::Static => self.static_ttl,
            TtlTier::Listing => self.listing,
            TtlTier::Detail => self.detail,
            TtlTier::Search => self.search,
            TtlTier::Aggregate => self.aggregate,
        }
    }

    /// Tier for one listing page.
    pub fn tier_for(criteria: &FilterCriteria, page: u32) -> TtlTier {
        if criteria.is_search() {
            TtlTier::Search
        } else if page <= 1 && criteria.category.is_none() {
            TtlTier::Static
        } else {
            TtlTier::Listing
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: CacheKey,
    pub payload: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }
}

/// Where a value handed out by [`CacheStore::get_or_fetch`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from a fresh entry.
    Hit,
    /// Fetched from the catalog just now.
    Fetched,
    /// The fetch failed and an expired entry was served instead.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Fetched<V> {
    pub value: V,
    pub freshness: Freshness,
}

/// Default number of entries before opportunistic eviction kicks in.
pub const DEFAULT_CAPACITY: usize = 500;

/// A keyed cache for one payload type. Clone-cheap; clones share entries.
pub struct CacheStore<V> {
    entries: Arc<DashMap<CacheKey, CacheEntry<V>>>,
    /// key → in-flight guard (singleflight per key)
    inflight: Arc<DashMap<CacheKey, Arc<Mutex<()>>>>,
    policy: Arc<TtlPolicy>,
    capacity: usize,
    monitor: Arc<CacheMonitor>,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            inflight: Arc::clone(&self.inflight),
            policy: Arc::clone(&self.policy),
            capacity: self.capacity,
            monitor: Arc::clone(&self.monitor),
        }
    }
}

impl<V: Clone> CacheStore<V> {
    pub fn new(policy: TtlPolicy, capacity: usize, monitor: Arc<CacheMonitor>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            inflight: Arc::new(DashMap::new()),
            policy: Arc::new(policy),
            capacity: capacity.max(1),
            monitor,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return a fresh entry, recording a hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let found = self.peek_fresh(key);
        match found {
            Some(_) => self.monitor.record_hit(),
            None => self.monitor.record_miss(),
        }
        found
    }

    /// Return an entry even if its TTL has passed, as long as it is under the
    /// hard ceiling. Not counted in the stats.
    pub fn get_stale(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.age(now) < self.policy.max_age)
            .map(|entry| entry.value().clone())
    }

    fn peek_fresh(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value().clone())
    }

    /// Store `payload`, replacing any previous entry with a new timestamp.
    pub fn set(&self, key: CacheKey, payload: V, tier: TtlTier) {
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            stored_at: Instant::now(),
            ttl: self.policy.ttl(tier),
        };
        self.entries.insert(key, entry);

        if self.entries.len() > self.capacity {
            self.evict_expired();
        }
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry whose key starts with `prefix`. Returns how many went.
    pub fn remove_prefix(&self, prefix: &CacheKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Bound memory. Entries past the hard ceiling always go. If the store is
    /// still over capacity, the oldest third of the stale entries go next, and
    /// if fresh entries alone exceed capacity the oldest of those go too.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        let max_age = self.policy.max_age;
        self.entries.retain(|_, entry| entry.age(now) < max_age);

        if self.entries.len() > self.capacity {
            let mut stale: Vec<(CacheKey, Instant)> = self
                .entries
                .iter()
                .filter(|entry| !entry.is_fresh(now))
                .map(|entry| (entry.key().clone(), entry.stored_at))
                .collect();
            stale.sort_by_key(|(_, stored_at)| *stored_at);
            let drop_count = stale.len().div_ceil(3);
            for (key, _) in stale.into_iter().take(drop_count) {
                self.entries.remove(&key);
            }
        }

        let overflow = self.entries.len().saturating_sub(self.capacity);
        if overflow > 0 {
            let mut oldest: Vec<(CacheKey, Instant)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.stored_at))
                .collect();
            oldest.sort_by_key(|(_, stored_at)| *stored_at);
            for (key, _) in oldest.into_iter().take(overflow) {
                self.entries.remove(&key);
            }
        }

        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "cache entries evicted");
        }
        evicted
    }

    /// Serve `key` from the cache, or run `fetch` and cache its result.
    ///
    /// Concurrent callers for the same key wait on one fetch instead of each
    /// issuing their own. When the fetch fails and a stale entry exists, the
    /// stale value is returned as [`Freshness::Stale`].
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &CacheKey,
        tier: TtlTier,
        fetch: F,
    ) -> Result<Fetched<V>, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CatalogError>>,
    {
        if let Some(entry) = self.get(key) {
            return Ok(Fetched {
                value: entry.payload,
                freshness: Freshness::Hit,
            });
        }

        let slot = InflightSlot::acquire(&self.inflight, key);
        let _guard = slot.lock().await;

        // Whoever held the slot before us may have filled the entry.
        if let Some(entry) = self.peek_fresh(key) {
            debug!(key = %key, "cache filled while waiting on in-flight fetch");
            return Ok(Fetched {
                value: entry.payload,
                freshness: Freshness::Hit,
            });
        }
        self.fetch_and_store(key, tier, fetch).await
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    async fn fetch_and_store<F, Fut>(
        &self,
        key: &CacheKey,
        tier: TtlTier,
        fetch: F,
    ) -> Result<Fetched<V>, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CatalogError>>,
    {
        let start = Instant::now();
        let result = fetch().await;
        let elapsed = start.elapsed();
        self.monitor.record_request(elapsed);

        match result {
            Ok(value) => {
                debug!(key = %key, elapsed = fmt_duration(elapsed), "cache filled");
                self.set(key.clone(), value.clone(), tier);
                Ok(Fetched {
                    value,
                    freshness: Freshness::Fetched,
                })
            }
            Err(CatalogError::Cancelled) => Err(CatalogError::Cancelled),
            Err(err) => match self.get_stale(key) {
                Some(entry) => {
                    warn!(
                        key = %key,
                        error = %err,
                        age = fmt_duration(entry.age(Instant::now())),
                        "fetch failed, serving stale entry"
                    );
                    Ok(Fetched {
                        value: entry.payload,
                        freshness: Freshness::Stale,
                    })
                }
                None => Err(err),
            },
        }
    }
}

/// A caller's hold on one key's in-flight lock. Dropping it, on completion
/// or because the caller's future was dropped mid-fetch, removes the map slot
/// once no other caller is waiting on it.
struct InflightSlot<'a> {
    inflight: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: &'a CacheKey,
    lock: Arc<Mutex<()>>,
}

impl<'a> InflightSlot<'a> {
    fn acquire(inflight: &'a DashMap<CacheKey, Arc<Mutex<()>>>, key: &'a CacheKey) -> Self {
        let lock = inflight.entry(key.clone()).or_default().clone();
        Self {
            inflight,
            key,
            lock,
        }
    }

    async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // One reference is the map's, one is ours.
        self.inflight
            .remove_if(self.key, |_, slot| Arc::strong_count(slot) <= 2);
    }
}
