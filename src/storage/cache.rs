//! The cache layer (C3): bounded TTL+LRU caches with stats, a named-cache
//! manager, and a write-coalescing access-count buffer.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};

/// Hit/miss/eviction/expiration counters for one cache, plus its derived
/// hit rate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Lookups that found nothing (expired or absent).
    pub misses: u64,
    /// Entries evicted to make room for a new insert.
    pub evictions: u64,
    /// Entries removed because their TTL had elapsed.
    pub expirations: u64,
    /// Current number of live entries.
    pub size: usize,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or `0.0` when nothing has been looked up yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A bounded-capacity, TTL-expiring, least-recently-used cache. Thread-safe
/// via a single mutex around the map and counters together.
pub struct TtlLruCache<V> {
    inner: Mutex<LruCache<String, Entry<V>>>,
    ttl: Duration,
    stats: Mutex<CacheStats>,
}

impl<V: Clone> TtlLruCache<V> {
    /// Creates a cache holding at most `capacity` live entries, each valid
    /// for `ttl` from insertion.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Returns the cached value for `key` if present and unexpired,
    /// recording a hit or miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());

        match inner.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                stats.hits += 1;
                Some(entry.value.clone())
            },
            Some(_) => {
                inner.pop(key);
                stats.misses += 1;
                stats.expirations += 1;
                None
            },
            None => {
                stats.misses += 1;
                None
            },
        }
    }

    /// Inserts `value` under `key`, evicting the least-recently-used entry
    /// if the cache is already at capacity.
    pub fn put(&self, key: String, value: V) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let was_full = inner.len() == inner.cap().get();
        let evicted = inner.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        stats.size = inner.len();
        if was_full && evicted.is_none() {
            stats.evictions += 1;
        }
    }

    /// Looks up `key`; on miss, calls `compute` and caches the result
    /// unless `is_missing` considers it absent (e.g. `None` results from an
    /// `Option`-shaped `compute`).
    pub fn get_or_insert_with(
        &self,
        key: &str,
        compute: impl FnOnce() -> V,
        is_missing: impl FnOnce(&V) -> bool,
    ) -> V {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        let value = compute();
        if !is_missing(&value) {
            self.put(key.to_string(), value.clone());
        }
        value
    }

    /// Removes every entry and resets size (but not cumulative stats).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.clear();
        self.stats.lock().unwrap_or_else(|p| p.into_inner()).size = 0;
    }

    /// A snapshot of current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Process-wide registry of named caches with independent capacity/TTL,
/// plus the access-count write-coalescing buffer.
pub struct CacheManager {
    /// Cache of `get_document` lookups.
    pub documents: TtlLruCache<crate::models::Document>,
    /// Cache of per-document tag lists.
    pub tags: TtlLruCache<Vec<crate::models::Tag>>,
    /// Cache of search result pages.
    pub search: TtlLruCache<Vec<crate::models::SearchHit>>,
    /// Cache of miscellaneous aggregation reports (freshness, drift, gaps, ...).
    pub aggregations: TtlLruCache<String>,
    enabled: Mutex<bool>,
    access_buffer: AccessCountBuffer,
}

impl CacheManager {
    /// Constructs the standard set of named caches with their default
    /// capacities and TTLs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: TtlLruCache::new(500, Duration::from_secs(300)),
            tags: TtlLruCache::new(200, Duration::from_secs(600)),
            search: TtlLruCache::new(200, Duration::from_secs(60)),
            aggregations: TtlLruCache::new(100, Duration::from_secs(120)),
            enabled: Mutex::new(true),
            access_buffer: AccessCountBuffer::new(50, Duration::from_secs(30)),
        }
    }

    /// Whether caching is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Disables caching globally and clears every cache.
    pub fn disable(&self) {
        *self.enabled.lock().unwrap_or_else(|p| p.into_inner()) = false;
        self.clear_all();
    }

    /// Re-enables caching.
    pub fn enable(&self) {
        *self.enabled.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }

    /// Clears every named cache.
    pub fn clear_all(&self) {
        self.documents.clear();
        self.tags.clear();
        self.search.clear();
        self.aggregations.clear();
    }

    /// Per-cache stats plus an aggregate total.
    #[must_use]
    pub fn stats(&self) -> HashMap<&'static str, CacheStats> {
        HashMap::from([
            ("documents", self.documents.stats()),
            ("tags", self.tags.stats()),
            ("search", self.search.stats()),
            ("aggregations", self.aggregations.stats()),
        ])
    }

    /// The access-count write-coalescing buffer.
    #[must_use]
    pub const fn access_buffer(&self) -> &AccessCountBuffer {
        &self.access_buffer
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Coalesces per-document view-count increments in memory, flushed by the
/// caller in a single transaction once a batch-size or time-interval
/// threshold is crossed (or on process exit).
pub struct AccessCountBuffer {
    counts: Mutex<HashMap<i64, i64>>,
    batch_threshold: usize,
    interval: Duration,
    last_flush: Mutex<Instant>,
}

impl AccessCountBuffer {
    /// Creates a buffer that recommends a flush once `batch_threshold`
    /// distinct increments have accumulated or `interval` has elapsed
    /// since the last flush, whichever comes first.
    #[must_use]
    pub fn new(batch_threshold: usize, interval: Duration) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            batch_threshold,
            interval,
            last_flush: Mutex::new(Instant::now()),
        }
    }

    /// Increments `doc_id`'s buffered counter and returns whether the
    /// caller should flush now.
    pub fn record(&self, doc_id: i64) -> bool {
        let mut counts = self.counts.lock().unwrap_or_else(|p| p.into_inner());
        *counts.entry(doc_id).or_insert(0) += 1;
        let over_batch = counts.len() >= self.batch_threshold;
        drop(counts);

        let over_interval = self
            .last_flush
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .elapsed()
            >= self.interval;

        over_batch || over_interval
    }

    /// Drains the buffered counts under lock and resets the flush clock.
    /// Returns an empty map if nothing was buffered.
    pub fn take(&self) -> HashMap<i64, i64> {
        let drained = std::mem::take(&mut *self.counts.lock().unwrap_or_else(|p| p.into_inner()));
        *self.last_flush.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hits() {
        let cache = TtlLruCache::new(2, Duration::from_secs(60));
        cache.put("a".into(), 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_on_absent_key() {
        let cache: TtlLruCache<i32> = TtlLruCache::new(2, Duration::from_secs(60));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn expired_entry_counts_as_miss_and_expiration() {
        let cache = TtlLruCache::new(2, Duration::from_millis(1));
        cache.put("a".into(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("a"), None);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let cache = TtlLruCache::new(1, Duration::from_secs(60));
        cache.put("a".into(), 1);
        cache.put("b".into(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn get_or_insert_with_skips_caching_missing_results() {
        let cache: TtlLruCache<Option<i32>> = TtlLruCache::new(2, Duration::from_secs(60));
        let mut calls = 0;
        for _ in 0..3 {
            calls += 1;
            cache.get_or_insert_with("k", || None, Option::is_none);
        }
        assert_eq!(calls, 3, "a never-cached miss is recomputed every time");
    }

    #[test]
    fn access_buffer_flags_flush_at_batch_threshold() {
        let buffer = AccessCountBuffer::new(2, Duration::from_secs(3600));
        assert!(!buffer.record(1));
        assert!(buffer.record(2));
        let drained = buffer.take();
        assert_eq!(drained.len(), 2);
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn manager_disable_clears_and_blocks_until_enabled() {
        let manager = CacheManager::new();
        manager.documents.put(
            "1".into(),
            crate::models::Document {
                id: 1,
                title: "t".into(),
                content: "c".into(),
                project: None,
                parent_id: None,
                created_at: String::new(),
                updated_at: String::new(),
                accessed_at: String::new(),
                access_count: 0,
                is_deleted: false,
                deleted_at: None,
                doc_type: crate::models::DocType::User,
            },
        );
        manager.disable();
        assert!(!manager.is_enabled());
        assert_eq!(manager.documents.stats().size, 0);
        manager.enable();
        assert!(manager.is_enabled());
    }
}
