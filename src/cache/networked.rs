//! Networked response store.
//!
//! Entries are written as a flat JSON record (status, headers, base64 body,
//! vary) with the store's native per-key expiry, so reads never re-check
//! TTL. Failures are logged and degrade to a miss, a skipped write or zero
//! removals.

use super::backend::ResponseCacheStore;
use super::entry::CachedResponse;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// Default `SCAN` page size for prefix purges.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Key-value operations the networked store needs.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Set with a TTL in whole seconds (always at least 1).
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;
    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<usize>;
    /// One page of a cursor scan. A returned cursor of 0 ends the scan.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;
}

/// Redis-backed [`KvStore`] over an auto-reconnecting connection manager.
#[derive(Clone)]
pub struct RedisKvStore {
    connection: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| {
            Error::backend_with_context(
                format!("invalid redis url: {}", e),
                ErrorContext::new()
                    .with_field_path("response.backend.url")
                    .with_source("redis"),
            )
        })?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn.set_ex(key, value, ttl_secs.max(1)).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection.clone();
        let removed: usize = conn.del(keys).await?;
        Ok(removed)
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.connection.clone();
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        Ok((next, keys))
    }
}

/// [`ResponseCacheStore`] over any [`KvStore`], namespacing keys with a
/// prefix.
pub struct NetworkedResponseCache<K> {
    kv: K,
    key_prefix: String,
    scan_count: usize,
}

impl<K: KvStore> NetworkedResponseCache<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv,
            key_prefix: String::new(),
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl<K: KvStore> ResponseCacheStore for NetworkedResponseCache<K> {
    async fn get(&self, key: &str) -> Option<CachedResponse> {
        let raw = match self.kv.get(&self.build_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(cache_key = key, error = %e, "networked cache get failed; treating as miss");
                return None;
            }
        };
        match serde_json::from_slice::<CachedResponse>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(cache_key = key, error = %e, "discarding undecodable cache record");
                None
            }
        }
    }

    async fn set(&self, key: &str, entry: CachedResponse) {
        let Some(ttl) = entry.remaining_ttl() else {
            debug!(cache_key = key, "skipping networked write without remaining lifetime");
            return;
        };
        let data = match serde_json::to_vec(&entry) {
            Ok(data) => data,
            Err(e) => {
                warn!(
                    cache_key = key,
                    error = %e,
                    "skipping networked write; serialization failed"
                );
                return;
            }
        };
        let ttl_secs = ttl_seconds(ttl);
        if let Err(e) = self.kv.set_ex(&self.build_key(key), data, ttl_secs).await {
            warn!(cache_key = key, ttl_secs, error = %e, "networked cache set failed");
        }
    }

    async fn purge(&self, key: &str) -> bool {
        match self.kv.del(&[self.build_key(key)]).await {
            Ok(n) => n > 0,
            Err(e) => {
                warn!(cache_key = key, error = %e, "networked cache purge failed");
                false
            }
        }
    }

    async fn purge_prefix(&self, prefix: &str) -> usize {
        let pattern = format!("{}*", escape_glob(&self.build_key(prefix)));
        let mut cursor = 0u64;
        let mut removed = 0usize;
        loop {
            let (next, keys) = match self.kv.scan(cursor, &pattern, self.scan_count).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(prefix, error = %e, removed, "networked prefix scan failed; stopping");
                    break;
                }
            };
            match self.kv.del(&keys).await {
                Ok(n) => removed += n,
                Err(e) => warn!(prefix, error = %e, "networked prefix delete failed"),
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        debug!(prefix, removed, "purged networked cache prefix");
        removed
    }

    fn name(&self) -> &'static str {
        "networked"
    }
}

/// Whole seconds for `SET EX`, rounding sub-second remainders up.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Escape glob metacharacters so a literal prefix can sit in a `MATCH`
/// pattern.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Ordered in-memory KV with paged scans and call accounting.
    #[derive(Default)]
    struct FakeKv {
        data: Mutex<BTreeMap<String, (Vec<u8>, u64)>>,
        snapshot: Mutex<Vec<String>>,
        scans: AtomicUsize,
        fail: bool,
    }

    impl FakeKv {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn check(&self) -> Result<()> {
            if self.fail {
                Err(Error::backend_with_context("down", ErrorContext::new()))
            } else {
                Ok(())
            }
        }
    }

    fn glob_prefix(pattern: &str) -> String {
        let mut out = String::new();
        let mut chars = pattern.strip_suffix('*').unwrap_or(pattern).chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[async_trait]
    impl KvStore for FakeKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.check()?;
            Ok(self.data.lock().unwrap().get(key).map(|(v, _)| v.clone()))
        }

        async fn set_ex(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
            self.check()?;
            self.data
                .lock()
                .unwrap()
                .insert(key.to_string(), (value, ttl_secs));
            Ok(())
        }

        async fn del(&self, keys: &[String]) -> Result<usize> {
            self.check()?;
            let mut data = self.data.lock().unwrap();
            Ok(keys.iter().filter(|k| data.remove(*k).is_some()).count())
        }

        async fn scan(
            &self,
            cursor: u64,
            pattern: &str,
            count: usize,
        ) -> Result<(u64, Vec<String>)> {
            self.check()?;
            self.scans.fetch_add(1, Ordering::SeqCst);
            let prefix = glob_prefix(pattern);
            let data = self.data.lock().unwrap();
            let mut snapshot = self.snapshot.lock().unwrap();
            // Like Redis, keys present for the whole scan are returned even
            // when others are deleted between pages.
            if cursor == 0 {
                *snapshot = data.keys().cloned().collect();
            }
            let start = cursor as usize;
            let end = (start + count).min(snapshot.len());
            let page = snapshot[start..end]
                .iter()
                .filter(|k| k.starts_with(&prefix) && data.contains_key(*k))
                .cloned()
                .collect();
            let next = if end >= snapshot.len() { 0 } else { end as u64 };
            Ok((next, page))
        }
    }

    fn entry(ttl: Duration) -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", http::HeaderValue::from_static("application/json"));
        CachedResponse::from_parts(200, &headers, Bytes::from_static(b"{\"ok\":true}"), ttl)
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips_record() {
        let cache = NetworkedResponseCache::new(FakeKv::default()).with_key_prefix("resp:");
        cache.set("k1", entry(Duration::from_millis(1500))).await;

        let stored = cache.kv.data.lock().unwrap().get("resp:k1").cloned();
        let (_, ttl_secs) = stored.expect("namespaced key");
        assert_eq!(ttl_secs, 2);

        let hit = cache.get("k1").await.expect("hit");
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, Bytes::from_static(b"{\"ok\":true}"));
        assert_eq!(hit.header("content-type"), Some("application/json"));
        assert!(hit.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_set_skips_entries_without_lifetime() {
        let cache = NetworkedResponseCache::new(FakeKv::default());
        cache.set("zero", entry(Duration::ZERO)).await;
        let mut unspecified = entry(Duration::from_secs(60));
        unspecified.expires_at = None;
        cache.set("none", unspecified).await;
        assert!(cache.kv.data.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backend_errors_degrade() {
        let cache = NetworkedResponseCache::new(FakeKv::failing());
        cache.set("k", entry(Duration::from_secs(60))).await;
        assert!(cache.get("k").await.is_none());
        assert!(!cache.purge("k").await);
        assert_eq!(cache.purge_prefix("k").await, 0);
    }

    #[tokio::test]
    async fn test_undecodable_record_is_a_miss() {
        let cache = NetworkedResponseCache::new(FakeKv::default());
        cache
            .kv
            .set_ex("bad", b"not json".to_vec(), 60)
            .await
            .unwrap();
        assert!(cache.get("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_purge_prefix_pages_through_keyspace() {
        let cache = NetworkedResponseCache::new(FakeKv::default())
            .with_key_prefix("resp:")
            .with_scan_count(2);
        for k in ["a:1", "a:2", "a:3", "a:4", "a:5", "b:1", "b:2"] {
            cache.set(k, entry(Duration::from_secs(60))).await;
        }
        assert!(cache.purge("a:1").await);
        assert!(!cache.purge("a:1").await);

        let removed = cache.purge_prefix("a:").await;
        assert_eq!(removed, 4);
        assert!(cache.kv.scans.load(Ordering::SeqCst) > 1);
        assert!(cache.get("b:1").await.is_some());
        assert!(cache.get("b:2").await.is_some());
        for k in ["a:2", "a:3", "a:4", "a:5"] {
            assert!(cache.get(k).await.is_none(), "{} survived", k);
        }
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(3)), 3);
        assert_eq!(ttl_seconds(Duration::from_millis(3001)), 4);
    }
}
