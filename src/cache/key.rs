//! Cache key derivation.
//!
//! Keys are SHA-256 hex digests over the request line, a sorted query, a
//! fixed subset of content-negotiation headers and, when supplied, a body
//! hash and a client-requested TTL class. Host and scheme never take part,
//! so the same request yields the same key proxy-side and upstream-side.
//!
//! The header subset (`Accept`, `Accept-Encoding`, `Accept-Language`) stands
//! in for per-response `Vary` replay. It is an approximation: a response
//! whose real `Vary` set names other headers can still be served to a
//! request that differs in those headers.

use http::header::{ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE};
use http::{HeaderName, Method, Request};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::control::CacheControl;

/// Request header carrying a caller-computed hash of the request body.
pub const BODY_HASH_HEADER: &str = "x-body-hash";

/// Headers folded into the key as a conservative `Vary` approximation.
pub const VARY_SUBSET: [HeaderName; 3] = [ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Derive the response-cache key for a request. Never fails.
pub fn derive_cache_key<B>(request: &Request<B>) -> CacheKey {
    let base_key = sha256_hex(canonical_request_line(request).as_bytes());

    let mut vary_input = base_key;
    for name in VARY_SUBSET.iter() {
        let values: Vec<String> = request
            .headers()
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
            .collect();
        if values.is_empty() {
            continue;
        }
        vary_input.push('|');
        vary_input.push_str(name.as_str());
        vary_input.push('=');
        vary_input.push_str(&values.join(","));
    }
    let vary_key = sha256_hex(vary_input.as_bytes());

    let mut suffix = String::new();
    if let Some(body_hash) = request
        .headers()
        .get(BODY_HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        suffix.push_str("|body=");
        suffix.push_str(body_hash);
    }
    if let Some(ttl_class) = requested_ttl_class(request) {
        suffix.push_str("|ttl=");
        suffix.push_str(&ttl_class);
    }

    if suffix.is_empty() {
        CacheKey::new(vary_key)
    } else {
        // Re-hash so the key stays a fixed-length digest.
        CacheKey::new(sha256_hex(format!("{}{}", vary_key, suffix).as_bytes()))
    }
}

/// Hash a request body into the form expected in [`BODY_HASH_HEADER`].
pub fn hash_body(body: &[u8]) -> String {
    sha256_hex(body)
}

fn canonical_request_line<B>(request: &Request<B>) -> String {
    let uri = request.uri();
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(query) = uri.query() {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(k.into_owned()).or_default().push(v.into_owned());
        }
    }
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (k, values) in params.iter_mut() {
        values.sort();
        for v in values.iter() {
            query.append_pair(k, v);
        }
    }
    format!("{}|{}|{}", request.method(), uri.path(), query.finish())
}

/// TTL class for body-bearing methods whose own `Cache-Control` opts into
/// shared caching, so differently-TTL'd requests never share an entry.
fn requested_ttl_class<B>(request: &Request<B>) -> Option<String> {
    let method = request.method();
    if *method != Method::POST && *method != Method::PUT && *method != Method::PATCH {
        return None;
    }
    let cc = CacheControl::from_headers(request.headers());
    if !cc.public {
        return None;
    }
    if let Some(s) = cc.positive_s_maxage() {
        return Some(format!("smax={}", s));
    }
    cc.positive_max_age().map(|m| format!("max={}", m))
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(uri: &str) -> http::request::Builder {
        Request::builder().method(Method::GET).uri(uri)
    }

    fn key(builder: http::request::Builder) -> CacheKey {
        derive_cache_key(&builder.body(()).unwrap())
    }

    #[test]
    fn test_key_is_fixed_length_hex() {
        let k = key(get("/v1/models"));
        assert_eq!(k.as_str().len(), 64);
        assert!(k.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_query_order_does_not_matter() {
        let a = key(get("/v1/models?b=2&a=1&a=0"));
        let b = key(get("/v1/models?a=0&b=2&a=1"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_query_values_distinguish_keys() {
        assert_ne!(key(get("/v1/models?a=1")), key(get("/v1/models?a=2")));
        assert_ne!(key(get("/v1/models?a=1,2")), key(get("/v1/models?a=1&a=2")));
    }

    #[test]
    fn test_host_and_scheme_are_ignored() {
        let a = key(get("https://proxy.internal/v1/models?x=1"));
        let b = key(get("http://api.upstream.example/v1/models?x=1"));
        let c = key(get("/v1/models?x=1"));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_method_and_path_distinguish_keys() {
        assert_ne!(key(get("/v1/models")), key(get("/v1/models/gpt")));
        let head = Request::builder().method(Method::HEAD).uri("/v1/models");
        assert_ne!(key(get("/v1/models")), key(head));
    }

    #[test]
    fn test_vary_subset_headers() {
        let plain = key(get("/v1/models"));
        let json = key(get("/v1/models").header("Accept", "application/json"));
        let json_padded = key(get("/v1/models").header("accept", "  application/json "));
        let gzip = key(get("/v1/models").header("Accept-Encoding", "gzip"));
        assert_ne!(plain, json);
        assert_eq!(json, json_padded);
        assert_ne!(json, gzip);
    }

    #[test]
    fn test_untracked_headers_are_ignored() {
        let a = key(get("/v1/models").header("User-Agent", "a"));
        let b = key(get("/v1/models").header("User-Agent", "b"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_body_hash_distinguishes_keys() {
        let post = || Request::builder().method(Method::POST).uri("/v1/chat/completions");
        let a = key(post().header(BODY_HASH_HEADER, hash_body(b"{\"a\":1}")));
        let b = key(post().header(BODY_HASH_HEADER, hash_body(b"{\"a\":2}")));
        let none = key(post());
        assert_ne!(a, b);
        assert_ne!(a, none);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_requested_ttl_class_for_post() {
        let post = || {
            Request::builder()
                .method(Method::POST)
                .uri("/v1/chat/completions")
                .header(BODY_HASH_HEADER, "abc")
        };
        let plain = key(post());
        let smax = key(post().header("Cache-Control", "public, s-maxage=60"));
        let max = key(post().header("Cache-Control", "public, max-age=60"));
        let smax_other = key(post().header("Cache-Control", "public, s-maxage=120"));
        let not_public = key(post().header("Cache-Control", "max-age=60"));
        assert_ne!(plain, smax);
        assert_ne!(smax, max);
        assert_ne!(smax, smax_other);
        assert_eq!(plain, not_public);
    }

    #[test]
    fn test_get_never_gets_ttl_class() {
        let a = key(get("/v1/models"));
        let b = key(get("/v1/models").header("Cache-Control", "public, max-age=60"));
        assert_eq!(a, b);
    }
}
