//! # ai-proxy-cache
//!
//! Caching core for a reverse proxy in front of an LLM provider API.
//!
//! ## Overview
//!
//! The crate avoids redundant upstream calls and redundant project metadata
//! lookups on the request hot path. It follows a pragmatic subset of HTTP
//! caching and never lets a response cached for one caller leak to an
//! authorized caller unless the upstream marked it shareable.
//!
//! ## Key Features
//!
//! - **Cache keys**: [`cache::derive_cache_key`] hashes method, path, sorted
//!   query and a Vary subset into a fixed-length SHA-256 key
//! - **Cache semantics**: `Cache-Control` parsing, storability, TTL and
//!   conditional (`304`) evaluation in [`cache`]
//! - **Stores**: in-process [`cache::MemoryResponseCache`] and Redis-backed
//!   [`cache::NetworkedResponseCache`] behind [`cache::ResponseCacheStore`]
//! - **Body capture**: [`cache::CaptureStream`] populates the store while
//!   the body streams to the client
//! - **Project metadata**: [`metadata::CachedProjectStore`] memoizes the
//!   active flag and upstream credential in TTL+LRU caches
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_proxy_cache::cache::{CacheLookup, ResponseCache};
//! use ai_proxy_cache::config::ProxyCacheConfig;
//!
//! #[tokio::main]
//! async fn main() -> ai_proxy_cache::Result<()> {
//!     let config = ProxyCacheConfig::from_yaml_str("response:\n  default_ttl_secs: 60\n")?
//!         .apply_env()?;
//!     let cache = ResponseCache::from_config(&config.response).await?;
//!
//!     let request = http::Request::get("/v1/models").body(()).unwrap();
//!     match cache.lookup(&request).await {
//!         CacheLookup::Hit(entry) => println!("cached {}", entry.status),
//!         _ => println!("forward upstream"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Response cache: keys, policy, stores, capture, facade |
//! | [`metadata`] | TTL+LRU project metadata caches and the project guard |
//! | [`config`] | Serde configuration with YAML and environment overrides |
//! | [`error`] | Error type with structured context |

pub mod cache;
pub mod config;
pub mod metadata;

mod utils;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};

pub use cache::{CacheLookup, CachedResponse, ResponseCache, ResponseCacheStore};
pub use config::ProxyCacheConfig;
pub use metadata::{CachedProjectStore, ProjectGuard, ProjectMetadataProvider};
