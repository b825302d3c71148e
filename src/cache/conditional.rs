//! Conditional request evaluation against cached validators.

use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use http::{HeaderMap, Request};

/// True when the client's conditional headers show its copy is current,
/// i.e. a `304 Not Modified` may be answered from the cached entry.
///
/// `If-None-Match` takes precedence over `If-Modified-Since`. Missing
/// validators or unparseable dates never match, so the caller falls back to
/// a full response rather than confirming a stale copy.
pub fn conditional_matches<B>(request: &Request<B>, cached_headers: &HeaderMap) -> bool {
    let headers = request.headers();

    if headers.contains_key(IF_NONE_MATCH) {
        let Some(cached_etag) = cached_headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(strip_quotes)
        else {
            return false;
        };
        return headers
            .get_all(IF_NONE_MATCH)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(strip_quotes)
            .any(|tag| tag == "*" || tag == cached_etag);
    }

    if let Some(since) = headers.get(IF_MODIFIED_SINCE) {
        let client = since
            .to_str()
            .ok()
            .and_then(|s| httpdate::parse_http_date(s.trim()).ok());
        let cached = cached_headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| httpdate::parse_http_date(s.trim()).ok());
        return match (client, cached) {
            (Some(client), Some(cached)) => cached <= client,
            _ => false,
        };
    }

    false
}

fn strip_quotes(tag: &str) -> &str {
    tag.trim().trim_matches('"')
}
