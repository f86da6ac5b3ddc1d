//! LookupCache - TTL memoization for expensive store lookups
//!
//! The cache never talks to the store. A miss is reported to the caller,
//! who fetches from the store and `put`s the result; store errors therefore
//! reach the caller unchanged.
//!
//! Entries leave the cache on explicit `invalidate` (someone changed the
//! underlying record), lazily on an expired read, or in `sweep_expired`.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A cached value with the instant it was stored
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    cached_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.cached_at) < ttl
    }
}

/// Counters for cache behaviour
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

/// Concurrent TTL cache keyed by `K`
#[derive(Debug)]
pub struct LookupCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    stats: CacheStats,
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or `None` on a miss
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// `get` as seen at `now`
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_fresh(now, self.ttl) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            // A concurrent put may have refreshed the entry meanwhile.
            let ttl = self.ttl;
            if self
                .entries
                .remove_if(key, |_, entry| !entry.is_fresh(now, ttl))
                .is_some()
            {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` for `key`, replacing any previous entry
    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    /// `put` stamped with `now`
    pub fn put_at(&self, key: K, value: V, now: Instant) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                cached_at: now,
            },
        );
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop `key` immediately, regardless of its age
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// `sweep_expired` as seen at `now`
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let ttl = self.ttl;
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let keep = entry.is_fresh(now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            inserts: self.stats.inserts.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
        }
    }
}
