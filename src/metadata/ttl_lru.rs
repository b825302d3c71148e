//! In-process TTL + LRU cache for hot-path lookups.

use crate::config::{MetadataCacheConfig, MAX_METADATA_TTL_SECS};
use crate::utils::lock::mutex_lock;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const SOURCE: &str = "metadata::ttl_lru";

/// Counter snapshot for one [`TtlLruCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl MetadataCacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded map with a fixed TTL per entry and strict LRU eviction.
///
/// Both `get` and `set` refresh recency. Expired entries are dropped when
/// read; nothing sweeps in the background. The recency list and the lookup
/// map live in one [`LruCache`] behind one mutex, so they cannot drift.
pub struct TtlLruCache<V> {
    entries: Mutex<LruCache<String, (V, Instant)>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone> TtlLruCache<V> {
    /// A capacity of 0 is treated as 1. TTLs longer than
    /// [`MAX_METADATA_TTL_SECS`] are clamped to it.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: ttl.min(Duration::from_secs(MAX_METADATA_TTL_SECS)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &MetadataCacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`, promoting it to most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let found = entries
            .get(key)
            .map(|(value, expires_at)| (*expires_at > now).then(|| value.clone()));
        match found {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some(None) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or refresh `key`, evicting the least recently used entry when
    /// the cache is full.
    pub fn set(&self, key: &str, value: V) {
        let now = Instant::now();
        let Some(expires_at) = now.checked_add(self.ttl) else {
            return;
        };
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");
        if let Some((old_key, _)) = entries.push(key.to_string(), (value, expires_at)) {
            if old_key != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Remove `key`; true iff it was present (expired or not).
    pub fn purge(&self, key: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "purge").pop(key).is_some()
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> MetadataCacheStats {
        MetadataCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
