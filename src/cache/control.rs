//! `Cache-Control` header parsing.

use http::header::CACHE_CONTROL;
use http::HeaderMap;

/// Directives parsed from a single `Cache-Control` value.
///
/// Parsing is a single linear scan over comma-separated directives, matched
/// case-insensitively. Boolean flags are set by their first occurrence;
/// numeric directives overwrite on every occurrence. A malformed number
/// degrades to `Some(0)`, which every consumer treats as "no freshness".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub must_revalidate: bool,
    pub public: bool,
    pub private: bool,
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
}

impl CacheControl {
    /// Parse a raw header value.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::default();
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, arg) = match part.split_once('=') {
                Some((n, a)) => (n.trim(), Some(a.trim().trim_matches('"'))),
                None => (part, None),
            };
            if name.eq_ignore_ascii_case("no-store") {
                cc.no_store = true;
            } else if name.eq_ignore_ascii_case("no-cache") {
                cc.no_cache = true;
            } else if name.eq_ignore_ascii_case("must-revalidate") {
                cc.must_revalidate = true;
            } else if name.eq_ignore_ascii_case("public") {
                cc.public = true;
            } else if name.eq_ignore_ascii_case("private") {
                cc.private = true;
            } else if name.eq_ignore_ascii_case("max-age") {
                cc.max_age = Some(parse_seconds(arg));
            } else if name.eq_ignore_ascii_case("s-maxage") {
                cc.s_maxage = Some(parse_seconds(arg));
            }
        }
        cc
    }

    /// Parse every `Cache-Control` value in a header map as one directive list.
    ///
    /// Non-UTF-8 values are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let joined = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        Self::parse(&joined)
    }

    /// `s-maxage` in seconds when present and positive.
    pub fn positive_s_maxage(&self) -> Option<u64> {
        self.s_maxage.filter(|s| *s > 0)
    }

    /// `max-age` in seconds when present and positive.
    pub fn positive_max_age(&self) -> Option<u64> {
        self.max_age.filter(|s| *s > 0)
    }

    /// True when a shared cache may hold this response for an
    /// authorization-bearing request: `public` or `s-maxage>0`.
    pub fn allows_shared(&self) -> bool {
        self.public || self.positive_s_maxage().is_some()
    }
}

fn parse_seconds(arg: Option<&str>) -> u64 {
    arg.and_then(|a| a.parse::<u64>().ok()).unwrap_or(0)
}
