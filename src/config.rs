//! Cache configuration.
//!
//! Values only: discovering and reading configuration files is the host
//! process's job. The structures deserialize from YAML (or any serde
//! format), fall back to defaults for omitted fields, and accept
//! `PROXY_CACHE_*` environment overrides.
//!
//! ```yaml
//! response:
//!   enabled: true
//!   default_ttl_secs: 300
//!   max_object_size: 1048576
//!   backend:
//!     kind: redis
//!     url: redis://127.0.0.1:6379
//!     key_prefix: "proxy:resp:"
//! project:
//!   active: { ttl_secs: 30, max_entries: 10000 }
//!   credential: { ttl_secs: 60, max_entries: 10000 }
//! ```

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_RESPONSE_TTL_SECS: u64 = 300;
const DEFAULT_MAX_OBJECT_SIZE: usize = 1024 * 1024;
const DEFAULT_REDIS_KEY_PREFIX: &str = "proxy:resp:";
const DEFAULT_SCAN_COUNT: usize = crate::cache::DEFAULT_SCAN_COUNT;

/// Longest accepted metadata cache TTL (one year).
pub const MAX_METADATA_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level configuration for the caching core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyCacheConfig {
    pub response: ResponseCacheConfig,
    pub project: ProjectCacheConfig,
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    pub enabled: bool,
    /// TTL applied when the upstream response carries no explicit freshness.
    pub default_ttl_secs: u64,
    /// Largest body, in bytes, that will be stored.
    pub max_object_size: usize,
    pub backend: BackendConfig,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: DEFAULT_RESPONSE_TTL_SECS,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            backend: BackendConfig::default(),
        }
    }
}

impl ResponseCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_max_object_size(mut self, bytes: usize) -> Self {
        self.max_object_size = bytes;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Response store backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory {
        #[serde(default)]
        max_entries: Option<usize>,
    },
    Redis {
        url: String,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
        #[serde(default = "default_scan_count")]
        scan_count: usize,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory { max_entries: None }
    }
}

impl BackendConfig {
    pub fn redis(url: impl Into<String>) -> Self {
        BackendConfig::Redis {
            url: url.into(),
            key_prefix: default_key_prefix(),
            scan_count: default_scan_count(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory { .. } => "memory",
            BackendConfig::Redis { .. } => "redis",
        }
    }
}

fn default_key_prefix() -> String {
    DEFAULT_REDIS_KEY_PREFIX.to_string()
}

fn default_scan_count() -> usize {
    DEFAULT_SCAN_COUNT
}

/// Settings for one hot-path metadata cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataCacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl MetadataCacheConfig {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl_secs: ttl.as_secs(),
            max_entries,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// The two per-project metadata caches, configured independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectCacheConfig {
    pub active: MetadataCacheConfig,
    pub credential: MetadataCacheConfig,
}

impl Default for ProjectCacheConfig {
    fn default() -> Self {
        Self {
            active: MetadataCacheConfig {
                ttl_secs: 30,
                max_entries: 10_000,
            },
            credential: MetadataCacheConfig {
                ttl_secs: 60,
                max_entries: 10_000,
            },
        }
    }
}

impl ProxyCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from YAML; omitted fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `PROXY_CACHE_*` overrides from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PROXY_CACHE_ENABLED` | `response.enabled` |
    /// | `PROXY_CACHE_TTL_SECS` | `response.default_ttl_secs` |
    /// | `PROXY_CACHE_MAX_OBJECT_BYTES` | `response.max_object_size` |
    /// | `PROXY_CACHE_BACKEND` | `memory` or `redis` |
    /// | `PROXY_CACHE_REDIS_URL` | redis `url` |
    /// | `PROXY_CACHE_REDIS_PREFIX` | redis `key_prefix` |
    /// | `PROXY_CACHE_PROJECT_ACTIVE_TTL_SECS` | `project.active.ttl_secs` |
    /// | `PROXY_CACHE_PROJECT_ACTIVE_MAX_ENTRIES` | `project.active.max_entries` |
    /// | `PROXY_CACHE_PROJECT_CREDENTIAL_TTL_SECS` | `project.credential.ttl_secs` |
    /// | `PROXY_CACHE_PROJECT_CREDENTIAL_MAX_ENTRIES` | `project.credential.max_entries` |
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PROXY_CACHE_ENABLED") {
            self.response.enabled = parse_env("PROXY_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("PROXY_CACHE_TTL_SECS") {
            self.response.default_ttl_secs = parse_env("PROXY_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("PROXY_CACHE_MAX_OBJECT_BYTES") {
            self.response.max_object_size = parse_env("PROXY_CACHE_MAX_OBJECT_BYTES", &v)?;
        }

        let url = lookup("PROXY_CACHE_REDIS_URL");
        let prefix = lookup("PROXY_CACHE_REDIS_PREFIX");
        match lookup("PROXY_CACHE_BACKEND").as_deref().map(str::trim) {
            Some("memory") => {
                if !matches!(self.response.backend, BackendConfig::Memory { .. }) {
                    self.response.backend = BackendConfig::default();
                }
            }
            Some("redis") => {
                if !matches!(self.response.backend, BackendConfig::Redis { .. }) {
                    self.response.backend = BackendConfig::redis(String::new());
                }
            }
            Some(other) => {
                return Err(Error::configuration_with_context(
                    format!("unknown cache backend '{}'", other),
                    ErrorContext::new()
                        .with_field_path("PROXY_CACHE_BACKEND")
                        .with_details("expected 'memory' or 'redis'")
                        .with_source("config"),
                ))
            }
            None => {}
        }
        if let BackendConfig::Redis {
            url: ref mut cfg_url,
            key_prefix: ref mut cfg_prefix,
            ..
        } = self.response.backend
        {
            if let Some(url) = url {
                *cfg_url = url;
            }
            if let Some(prefix) = prefix {
                *cfg_prefix = prefix;
            }
        }

        let project_vars: [(&str, &mut u64); 2] = [
            (
                "PROXY_CACHE_PROJECT_ACTIVE_TTL_SECS",
                &mut self.project.active.ttl_secs,
            ),
            (
                "PROXY_CACHE_PROJECT_CREDENTIAL_TTL_SECS",
                &mut self.project.credential.ttl_secs,
            ),
        ];
        for (name, field) in project_vars {
            if let Some(v) = lookup(name) {
                *field = parse_env(name, &v)?;
            }
        }
        let project_limits: [(&str, &mut usize); 2] = [
            (
                "PROXY_CACHE_PROJECT_ACTIVE_MAX_ENTRIES",
                &mut self.project.active.max_entries,
            ),
            (
                "PROXY_CACHE_PROJECT_CREDENTIAL_MAX_ENTRIES",
                &mut self.project.credential.max_entries,
            ),
        ];
        for (name, field) in project_limits {
            if let Some(v) = lookup(name) {
                *field = parse_env(name, &v)?;
            }
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the caches cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.response.max_object_size == 0 {
            return Err(invalid("response.max_object_size", "must be greater than zero"));
        }
        match &self.response.backend {
            BackendConfig::Memory {
                max_entries: Some(0),
            } => {
                return Err(invalid(
                    "response.backend.max_entries",
                    "must be greater than zero when set",
                ))
            }
            BackendConfig::Redis {
                url, scan_count, ..
            } => {
                if url.trim().is_empty() {
                    return Err(invalid(
                        "response.backend.url",
                        "redis backend needs a url",
                    ));
                }
                if *scan_count == 0 {
                    return Err(invalid(
                        "response.backend.scan_count",
                        "must be greater than zero",
                    ));
                }
            }
            BackendConfig::Memory { .. } => {}
        }
        for (path, cfg) in [
            ("project.active", &self.project.active),
            ("project.credential", &self.project.credential),
        ] {
            if cfg.ttl_secs == 0 {
                return Err(invalid(
                    &format!("{}.ttl_secs", path),
                    "must be greater than zero",
                ));
            }
            if cfg.ttl_secs > MAX_METADATA_TTL_SECS {
                return Err(invalid(
                    &format!("{}.ttl_secs", path),
                    "must not exceed one year",
                ));
            }
            if cfg.max_entries == 0 {
                return Err(invalid(
                    &format!("{}.max_entries", path),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, details: &str) -> Error {
    Error::configuration_with_context(
        "invalid cache configuration",
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config"),
    )
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        Error::configuration_with_context(
            format!("cannot parse environment variable {}", name),
            ErrorContext::new()
                .with_field_path(name)
                .with_details(format!("value '{}'", value))
                .with_source("config"),
        )
    })
}
