//! Response cache facade.
//!
//! [`ResponseCache`] strings the cache primitives together for a proxy
//! handler: look a request up, decide whether the upstream response may be
//! stored, and wrap the upstream body so the store is populated as the body
//! streams to the client.

use super::backend::{MemoryResponseCache, ResponseCacheStore};
use super::capture::{CaptureStream, CapturedBody};
use super::conditional::conditional_matches;
use super::entry::CachedResponse;
use super::key::{derive_cache_key, CacheKey};
use super::networked::{NetworkedResponseCache, RedisKvStore};
use super::policy::{
    cache_ttl, can_serve_cached_for_request, has_client_cache_opt_in, has_client_conditionals,
    is_response_cacheable, request_forced_ttl, wants_revalidation,
};
use crate::config::{BackendConfig, ResponseCacheConfig};
use crate::Result;
use bytes::Bytes;
use futures::Stream;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH};
use http::{HeaderMap, Method, Request, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of [`ResponseCache::lookup`].
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Serve the stored response.
    Hit(CachedResponse),
    /// The client's validators match the stored entry; answer `304`.
    NotModified(CachedResponse),
    /// Nothing usable stored under `key`; forward upstream.
    Miss(CacheKey),
    /// The cache must not answer this request. The response may still be
    /// offered to [`ResponseCache::store_decision`].
    Bypass,
}

/// Everything needed to store a response once its body has been captured.
#[derive(Debug, Clone)]
pub struct StorePlan {
    pub key: CacheKey,
    pub status: u16,
    pub headers: HeaderMap,
    pub ttl: Duration,
}

/// Snapshot of the facade's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub not_modified: u64,
    pub bypasses: u64,
    pub stores: u64,
    pub skips: u64,
}

impl ResponseCacheStats {
    /// Share of lookups answered from the cache (hits and 304s).
    pub fn hit_ratio(&self) -> f64 {
        let served = self.hits + self.not_modified;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    not_modified: AtomicU64,
    bypasses: AtomicU64,
    stores: AtomicU64,
    skips: AtomicU64,
}

impl AtomicStats {
    fn snapshot(&self) -> ResponseCacheStats {
        ResponseCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            not_modified: self.not_modified.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
        }
    }
}

/// Build the configured response store.
pub async fn build_response_store(
    config: &ResponseCacheConfig,
) -> Result<Arc<dyn ResponseCacheStore>> {
    match &config.backend {
        BackendConfig::Memory { max_entries } => {
            let store = match max_entries {
                Some(max) => MemoryResponseCache::new().with_max_entries(*max),
                None => MemoryResponseCache::new(),
            };
            Ok(Arc::new(store))
        }
        BackendConfig::Redis {
            url,
            key_prefix,
            scan_count,
        } => {
            let kv = RedisKvStore::connect(url).await?;
            Ok(Arc::new(
                NetworkedResponseCache::new(kv)
                    .with_key_prefix(key_prefix.clone())
                    .with_scan_count(*scan_count),
            ))
        }
    }
}

/// Response cache bound to one store.
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn ResponseCacheStore>,
    enabled: bool,
    default_ttl: Duration,
    max_object_size: usize,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn ResponseCacheStore>, config: &ResponseCacheConfig) -> Self {
        Self {
            store,
            enabled: config.enabled,
            default_ttl: config.default_ttl(),
            max_object_size: config.max_object_size,
            stats: Arc::new(AtomicStats::default()),
        }
    }

    /// Build the configured store and bind it.
    pub async fn from_config(config: &ResponseCacheConfig) -> Result<Self> {
        let store = build_response_store(config).await?;
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &Arc<dyn ResponseCacheStore> {
        &self.store
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn stats(&self) -> ResponseCacheStats {
        self.stats.snapshot()
    }

    /// Consult the store for `request`.
    pub async fn lookup<B>(&self, request: &Request<B>) -> CacheLookup {
        if !self.enabled || !method_eligible(request) {
            self.stats.bypasses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Bypass;
        }
        if wants_revalidation(request) {
            debug!(path = %request.uri().path(), reason = "revalidate", "cache bypass");
            self.stats.bypasses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Bypass;
        }

        let key = derive_cache_key(request);
        let Some(entry) = self.store.get(key.as_str()).await else {
            debug!(cache_key = %key, "cache miss");
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Miss(key);
        };

        let cached_headers = entry.header_map();
        if !can_serve_cached_for_request(request, &cached_headers) {
            debug!(cache_key = %key, reason = "authorization", "cached entry not shareable");
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Miss(key);
        }

        if has_client_conditionals(request) && conditional_matches(request, &cached_headers) {
            debug!(cache_key = %key, "cache hit, validators match");
            self.stats.not_modified.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::NotModified(entry);
        }

        debug!(cache_key = %key, status = entry.status, "cache hit");
        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        CacheLookup::Hit(entry)
    }

    /// Decide whether `response` should be stored and for how long.
    ///
    /// When the upstream sent no `Cache-Control` at all, a TTL the client
    /// forced with `public, s-maxage`/`max-age` takes over from the default.
    pub fn store_decision<Q, B>(
        &self,
        request: &Request<Q>,
        response: &Response<B>,
    ) -> Option<StorePlan> {
        if !self.enabled || !method_eligible(request) {
            return None;
        }
        if !is_response_cacheable(request, response) {
            self.skip("not_cacheable");
            return None;
        }
        if declared_length(response.headers()).is_some_and(|len| len > self.max_object_size) {
            self.skip("too_large");
            return None;
        }

        let headers = response.headers();
        let forced = request_forced_ttl(request);
        let ttl = if !headers.contains_key(CACHE_CONTROL) && !forced.is_zero() {
            forced
        } else {
            cache_ttl(headers, self.default_ttl)
        };
        if ttl.is_zero() {
            self.skip("zero_ttl");
            return None;
        }

        Some(StorePlan {
            key: derive_cache_key(request),
            status: response.status().as_u16(),
            headers: headers.clone(),
            ttl,
        })
    }

    /// Wrap an upstream body so it is written to the store once fully read.
    ///
    /// Bodies that end early, fail, or exceed `max_object_size` are
    /// forwarded untouched but not stored. The write runs on a spawned task.
    pub fn capture<S, E>(&self, plan: StorePlan, body: S) -> CaptureStream<S>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    {
        let store = Arc::clone(&self.store);
        let stats = Arc::clone(&self.stats);

        CaptureStream::new(
            body,
            self.max_object_size,
            Box::new(move |captured: CapturedBody| {
                if !captured.is_whole_body() {
                    debug!(
                        cache_key = %plan.key,
                        total_len = captured.total_len,
                        complete = captured.complete,
                        "body not stored"
                    );
                    stats.skips.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                let entry = CachedResponse::from_parts(
                    plan.status,
                    &plan.headers,
                    captured.bytes,
                    plan.ttl,
                );
                let key = plan.key;
                let ttl_secs = plan.ttl.as_secs();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        stats.stores.fetch_add(1, Ordering::Relaxed);
                        handle.spawn(async move {
                            debug!(cache_key = %key, ttl_secs, "storing response");
                            store.set(key.as_str(), entry).await;
                        });
                    }
                    Err(_) => {
                        warn!(cache_key = %key, "no async runtime, response not stored");
                        stats.skips.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }),
        )
    }

    pub async fn purge(&self, key: &str) -> bool {
        self.store.purge(key).await
    }

    pub async fn purge_prefix(&self, prefix: &str) -> usize {
        self.store.purge_prefix(prefix).await
    }

    fn skip(&self, reason: &'static str) {
        debug!(reason, "response not cacheable");
        self.stats.skips.fetch_add(1, Ordering::Relaxed);
    }
}

/// GET and HEAD are always eligible; POST, PUT and PATCH only when the
/// client opted into shared caching.
fn method_eligible<B>(request: &Request<B>) -> bool {
    let method = request.method();
    if *method == Method::GET || *method == Method::HEAD {
        return true;
    }
    (*method == Method::POST || *method == Method::PUT || *method == Method::PATCH)
        && has_client_cache_opt_in(request)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
