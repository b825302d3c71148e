//! Cacheability rules.
//!
//! A pragmatic subset of HTTP caching: what may be stored, for how long, and
//! whether a stored entry may be served to a given caller. The
//! `Authorization` rules here are the cross-tenant leak guard and apply on
//! both the write and the read path.

use http::header::{AUTHORIZATION, CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH, VARY};
use http::{HeaderMap, Request, Response};
use std::time::Duration;

use super::control::CacheControl;

/// Status codes eligible for storage.
pub const CACHEABLE_STATUSES: [u16; 6] = [200, 203, 301, 308, 404, 410];

/// Decide whether an upstream response may be stored.
///
/// `request` is the request that produced the response; its `Authorization`
/// header restricts storage to responses that explicitly allow shared
/// caching.
pub fn is_response_cacheable<Q, B>(request: &Request<Q>, response: &Response<B>) -> bool {
    let headers = response.headers();
    let cc = CacheControl::from_headers(headers);
    if cc.no_store || cc.private {
        return false;
    }
    if !CACHEABLE_STATUSES.contains(&response.status().as_u16()) {
        return false;
    }
    if request.headers().contains_key(AUTHORIZATION) && !cc.allows_shared() {
        return false;
    }
    if is_event_stream(headers) {
        return false;
    }
    !has_wildcard_vary(headers)
}

/// Freshness lifetime for a response. `Duration::ZERO` means do not store.
pub fn cache_ttl(headers: &HeaderMap, default_ttl: Duration) -> Duration {
    let cc = CacheControl::from_headers(headers);
    if cc.no_store {
        return Duration::ZERO;
    }
    if let Some(s) = cc.positive_s_maxage() {
        return Duration::from_secs(s);
    }
    if let Some(m) = cc.positive_max_age() {
        return Duration::from_secs(m);
    }
    if cc.public || (!cc.private && !cc.no_cache) {
        return default_ttl;
    }
    Duration::ZERO
}

/// Client-requested TTL for upstreams that send no cache hints.
///
/// Only honoured when the request's own `Cache-Control` is `public`;
/// `s-maxage` wins over `max-age`. Zero when the client did not opt in.
pub fn request_forced_ttl<B>(request: &Request<B>) -> Duration {
    let cc = CacheControl::from_headers(request.headers());
    if !cc.public {
        return Duration::ZERO;
    }
    cc.positive_s_maxage()
        .or_else(|| cc.positive_max_age())
        .map(Duration::from_secs)
        .unwrap_or(Duration::ZERO)
}

/// Whether a stored response may be served to this request.
///
/// Requests without `Authorization` may always be served. Authorized
/// requests only get entries whose stored `Cache-Control` is `public` or
/// carries `s-maxage>0`.
pub fn can_serve_cached_for_request<B>(request: &Request<B>, cached_headers: &HeaderMap) -> bool {
    if !request.headers().contains_key(AUTHORIZATION) {
        return true;
    }
    CacheControl::from_headers(cached_headers).allows_shared()
}

/// Request explicitly opts into shared caching: `public` plus a non-zero
/// `max-age` or `s-maxage`.
pub fn has_client_cache_opt_in<B>(request: &Request<B>) -> bool {
    let cc = CacheControl::from_headers(request.headers());
    cc.public && (cc.positive_max_age().is_some() || cc.positive_s_maxage().is_some())
}

/// Request carries `If-None-Match` or `If-Modified-Since`.
pub fn has_client_conditionals<B>(request: &Request<B>) -> bool {
    let headers = request.headers();
    headers.contains_key(IF_NONE_MATCH) || headers.contains_key(IF_MODIFIED_SINCE)
}

/// Request asks for revalidation: `no-cache` or `max-age=0`.
pub fn wants_revalidation<B>(request: &Request<B>) -> bool {
    let cc = CacheControl::from_headers(request.headers());
    cc.no_cache || cc.max_age == Some(0)
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            ct.trim()
                .to_ascii_lowercase()
                .starts_with("text/event-stream")
        })
        .unwrap_or(false)
}

fn has_wildcard_vary(headers: &HeaderMap) -> bool {
    headers
        .get_all(VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|v| v.trim() == "*")
}
