//! Response cache store trait and the in-process backend.

use super::entry::CachedResponse;
use crate::utils::lock::mutex_lock;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::debug;

const SOURCE: &str = "cache::backend";

/// Storage for cached responses.
///
/// Every operation is best-effort: backends swallow their own failures and
/// report them as a miss, a skipped write or zero removals.
#[async_trait]
pub trait ResponseCacheStore: Send + Sync {
    /// Owned copy of a live entry, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Option<CachedResponse>;
    /// Store an entry. Entries without remaining lifetime are ignored.
    async fn set(&self, key: &str, entry: CachedResponse);
    /// Remove one key; true iff an entry existed.
    async fn purge(&self, key: &str) -> bool;
    /// Remove every key starting with `prefix`; returns how many were removed.
    async fn purge_prefix(&self, prefix: &str) -> usize;
    fn name(&self) -> &'static str;
}

/// In-process store. Expiry is checked lazily on `get`; there is no
/// background sweep, so expired entries linger until read, purged or
/// displaced by the capacity bound.
pub struct MemoryResponseCache {
    entries: Mutex<HashMap<String, CachedResponse>>,
    max_entries: Option<usize>,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: None,
        }
    }

    /// Bound the number of stored entries.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn make_room(&self, entries: &mut HashMap<String, CachedResponse>, incoming: &str) {
        let Some(max) = self.max_entries else {
            return;
        };
        if entries.len() < max || entries.contains_key(incoming) {
            return;
        }
        let now = SystemTime::now();
        entries.retain(|_, e| e.expires_at.map(|at| at > now).unwrap_or(false));
        while entries.len() >= max {
            let soonest = entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match soonest {
                Some(k) => {
                    debug!(cache_key = %k, "evicting response entry closest to expiry");
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseCacheStore for MemoryResponseCache {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let expired = entries.get(key)?.is_expired();
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).cloned()
    }

    async fn set(&self, key: &str, entry: CachedResponse) {
        if entry.is_expired() {
            return;
        }
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");
        self.make_room(&mut entries, key);
        entries.insert(key.to_string(), entry);
    }

    async fn purge(&self, key: &str) -> bool {
        mutex_lock(&self.entries, SOURCE, "purge")
            .remove(key)
            .is_some()
    }

    async fn purge_prefix(&self, prefix: &str) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "purge_prefix");
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;
    use std::time::Duration;

    fn entry(ttl: Duration) -> CachedResponse {
        CachedResponse::from_parts(200, &HeaderMap::new(), Bytes::from_static(b"ok"), ttl)
    }

    #[tokio::test]
    async fn test_set_get_purge() {
        let cache = MemoryResponseCache::new();
        assert!(cache.get("k").await.is_none());
        cache.set("k", entry(Duration::from_secs(60))).await;
        let hit = cache.get("k").await.expect("hit");
        assert_eq!(hit.body, Bytes::from_static(b"ok"));
        assert!(cache.purge("k").await);
        assert!(!cache.purge("k").await);
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entries_are_skipped_and_removed_lazily() {
        let cache = MemoryResponseCache::new();
        cache.set("zero", entry(Duration::ZERO)).await;
        assert!(cache.is_empty());

        cache.set("short", entry(Duration::from_millis(30))).await;
        assert_eq!(cache.len(), 1);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get("short").await.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_entry_without_expiry_is_not_stored() {
        let cache = MemoryResponseCache::new();
        let mut e = entry(Duration::from_secs(60));
        e.expires_at = None;
        cache.set("k", e).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_purge_prefix_counts_only_live_matches() {
        let cache = MemoryResponseCache::new();
        for k in ["a:1", "a:2", "b:1"] {
            cache.set(k, entry(Duration::from_secs(60))).await;
        }
        assert!(cache.purge("a:1").await);
        assert_eq!(cache.purge_prefix("a:").await, 1);
        assert!(cache.get("a:2").await.is_none());
        assert!(cache.get("b:1").await.is_some());
        assert_eq!(cache.purge_prefix("zzz").await, 0);
    }

    #[tokio::test]
    async fn test_returned_entries_are_copies() {
        let cache = MemoryResponseCache::new();
        cache.set("k", entry(Duration::from_secs(60))).await;
        let mut first = cache.get("k").await.unwrap();
        first.status = 500;
        first.headers.insert("x".into(), vec!["y".into()]);
        let second = cache.get("k").await.unwrap();
        assert_eq!(second.status, 200);
        assert!(second.headers.get("x").is_none());
    }

    #[tokio::test]
    async fn test_capacity_bound_evicts_closest_to_expiry() {
        let cache = MemoryResponseCache::new().with_max_entries(2);
        cache.set("short", entry(Duration::from_secs(10))).await;
        cache.set("long", entry(Duration::from_secs(600))).await;
        cache.set("new", entry(Duration::from_secs(300))).await;
        assert_eq!(cache.len(), 2);
        assert!(cache.get("short").await.is_none());
        assert!(cache.get("long").await.is_some());
        assert!(cache.get("new").await.is_some());

        // Overwriting an existing key never evicts.
        cache.set("long", entry(Duration::from_secs(5))).await;
        assert_eq!(cache.len(), 2);
    }
}
