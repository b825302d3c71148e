//! Cached response entries.

use bytes::Bytes;
use http::header::VARY;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Connection-scoped headers never persisted into an entry.
pub const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// A stored response.
///
/// Stores hand out owned clones; the body is an immutable `Bytes` buffer, so
/// a clone shares bytes but no caller can mutate what another one sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(with = "base64_body")]
    pub body: Bytes,
    #[serde(default)]
    pub vary: String,
    /// Absolute expiry. Not serialized: networked stores use native key TTL.
    #[serde(skip)]
    pub expires_at: Option<SystemTime>,
}

impl CachedResponse {
    /// Build an entry from upstream response parts, dropping hop-by-hop
    /// headers and stamping an expiry `ttl` from now.
    ///
    /// Header values that are not valid UTF-8 (obs-text, e.g. a Latin-1
    /// `Content-Disposition` filename) are kept with each invalid sequence
    /// replaced by U+FFFD, so replay preserves the header but not its exact
    /// bytes.
    pub fn from_parts(status: u16, headers: &HeaderMap, body: Bytes, ttl: Duration) -> Self {
        let mut stored: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers.iter() {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            let value = match value.to_str() {
                Ok(text) => text.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            stored
                .entry(name.as_str().to_string())
                .or_default()
                .push(value);
        }
        let vary = stored
            .get(VARY.as_str())
            .map(|v| v.join(", "))
            .unwrap_or_default();
        Self {
            status,
            headers: stored,
            body,
            vary,
            expires_at: SystemTime::now().checked_add(ttl),
        }
    }

    /// Time left before expiry, or `None` when the entry has no expiry or
    /// it already passed.
    pub fn remaining_ttl(&self) -> Option<Duration> {
        let expires_at = self.expires_at?;
        expires_at
            .duration_since(SystemTime::now())
            .ok()
            .filter(|d| !d.is_zero())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ttl().is_none()
    }

    /// First value of a stored header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Rebuild an `http` header map for replay or policy checks.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, values) in &self.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_str(value) {
                    map.append(name.clone(), value);
                }
            }
        }
        map
    }
}

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("content-type", HeaderValue::from_static("application/json"));
        h.insert("connection", HeaderValue::from_static("keep-alive"));
        h.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        h.insert("etag", HeaderValue::from_static("\"v1\""));
        h.append("vary", HeaderValue::from_static("Accept"));
        h.append("vary", HeaderValue::from_static("Accept-Encoding"));
        h
    }

    #[test]
    fn test_from_parts_strips_hop_by_hop() {
        let entry = CachedResponse::from_parts(
            200,
            &upstream_headers(),
            Bytes::from_static(b"{}"),
            Duration::from_secs(60),
        );
        assert!(entry.headers.get("connection").is_none());
        assert!(entry.headers.get("transfer-encoding").is_none());
        assert_eq!(entry.header("Content-Type"), Some("application/json"));
        assert_eq!(entry.header("etag"), Some("\"v1\""));
        assert_eq!(entry.vary, "Accept, Accept-Encoding");
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_obs_text_header_survives_replay() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-disposition",
            HeaderValue::from_bytes(b"attachment; filename=\"caf\xe9.txt\"").unwrap(),
        );
        let entry = CachedResponse::from_parts(
            200,
            &headers,
            Bytes::from_static(b"x"),
            Duration::from_secs(60),
        );
        assert_eq!(
            entry.header("content-disposition"),
            Some("attachment; filename=\"caf\u{FFFD}.txt\"")
        );
        let replayed = entry.header_map();
        let value = replayed.get("content-disposition").expect("header kept");
        assert!(value.as_bytes().starts_with(b"attachment; filename=\"caf"));
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let entry =
            CachedResponse::from_parts(200, &HeaderMap::new(), Bytes::new(), Duration::ZERO);
        assert!(entry.is_expired());
        assert!(entry.remaining_ttl().is_none());
    }

    #[test]
    fn test_serialized_record_is_flat_and_skips_expiry() {
        let entry = CachedResponse::from_parts(
            203,
            &upstream_headers(),
            Bytes::from_static(b"hello"),
            Duration::from_secs(60),
        );
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], 203);
        assert_eq!(json["body"], "aGVsbG8=");
        assert!(json.get("expires_at").is_none());

        let back: CachedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back.body, Bytes::from_static(b"hello"));
        assert_eq!(back.vary, entry.vary);
        assert!(back.expires_at.is_none());
    }

    #[test]
    fn test_header_map_round_trips_multi_values() {
        let entry = CachedResponse::from_parts(
            200,
            &upstream_headers(),
            Bytes::new(),
            Duration::from_secs(1),
        );
        let map = entry.header_map();
        assert_eq!(map.get_all("vary").iter().count(), 2);
        assert!(map.get("connection").is_none());
    }
}
