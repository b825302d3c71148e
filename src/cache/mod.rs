//! HTTP response caching for the proxy.
//!
//! # Response Caching Module
//!
//! Stores upstream responses keyed by a digest of the request, honouring a
//! pragmatic subset of HTTP caching semantics.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`derive_cache_key`] | Deterministic SHA-256 key from method, path, query and a Vary subset |
//! | [`CacheControl`] | Parsed `Cache-Control` directives |
//! | [`is_response_cacheable`], [`cache_ttl`] | Storage and freshness rules |
//! | [`conditional_matches`] | `If-None-Match` / `If-Modified-Since` evaluation |
//! | [`ResponseCacheStore`] | Backend trait |
//! | [`MemoryResponseCache`], [`NetworkedResponseCache`] | In-process and Redis stores |
//! | [`CaptureStream`] | Pass-through body adapter that captures a bounded prefix |
//! | [`ResponseCache`] | Facade tying lookup, store decision and capture together |
//!
//! ## Example
//!
//! ```rust
//! use ai_proxy_cache::cache::{derive_cache_key, MemoryResponseCache, ResponseCache, CacheLookup};
//! use ai_proxy_cache::config::ResponseCacheConfig;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cache = ResponseCache::new(
//!     Arc::new(MemoryResponseCache::new()),
//!     &ResponseCacheConfig::default(),
//! );
//! let request = http::Request::get("/v1/models").body(()).unwrap();
//! assert!(matches!(cache.lookup(&request).await, CacheLookup::Miss(_)));
//! assert_eq!(derive_cache_key(&request).as_str().len(), 64);
//! # });
//! ```
//!
//! Authorization-bearing requests are only ever stored or served when the
//! response explicitly allows shared caching (`public` or `s-maxage>0`).

mod backend;
mod capture;
mod conditional;
mod control;
mod entry;
mod key;
mod manager;
mod networked;
mod policy;

pub use backend::{MemoryResponseCache, ResponseCacheStore};
pub use capture::{CaptureStream, CapturedBody, FinalizeFn};
pub use conditional::conditional_matches;
pub use control::CacheControl;
pub use entry::{CachedResponse, HOP_BY_HOP_HEADERS};
pub use key::{derive_cache_key, hash_body, CacheKey, BODY_HASH_HEADER, VARY_SUBSET};
pub use manager::{
    build_response_store, CacheLookup, ResponseCache, ResponseCacheStats, StorePlan,
};
pub use networked::{KvStore, NetworkedResponseCache, RedisKvStore, DEFAULT_SCAN_COUNT};
pub use policy::{
    cache_ttl, can_serve_cached_for_request, has_client_cache_opt_in, has_client_conditionals,
    is_response_cacheable, request_forced_ttl, wants_revalidation, CACHEABLE_STATUSES,
};
