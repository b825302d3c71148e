//! Cached per-project metadata lookups.

use super::ttl_lru::{MetadataCacheStats, TtlLruCache};
use crate::config::ProjectCacheConfig;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Persistent source of project metadata.
#[async_trait]
pub trait ProjectMetadataProvider: Send + Sync {
    /// Whether the project may currently serve traffic.
    async fn get_active(&self, project_id: &str) -> Result<bool>;
    /// Upstream credential for the project; empty when none is configured.
    async fn get_credential(&self, project_id: &str) -> Result<String>;
}

#[async_trait]
impl<P: ProjectMetadataProvider + ?Sized> ProjectMetadataProvider for Arc<P> {
    async fn get_active(&self, project_id: &str) -> Result<bool> {
        (**self).get_active(project_id).await
    }

    async fn get_credential(&self, project_id: &str) -> Result<String> {
        (**self).get_credential(project_id).await
    }
}

/// Project lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    Created(String),
    Updated(String),
    Deleted(String),
}

impl ProjectEvent {
    pub fn project_id(&self) -> &str {
        match self {
            ProjectEvent::Created(id) | ProjectEvent::Updated(id) | ProjectEvent::Deleted(id) => id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ProjectEvent::Created(_) => "created",
            ProjectEvent::Updated(_) => "updated",
            ProjectEvent::Deleted(_) => "deleted",
        }
    }
}

/// Hit/miss counters for both project caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectCacheStats {
    pub active: MetadataCacheStats,
    pub credential: MetadataCacheStats,
}

/// Read-through cache in front of a [`ProjectMetadataProvider`].
///
/// Provider errors pass through and are never cached. Both `true` and
/// `false` activity flags are cached; an empty credential is not, since it
/// cannot be told apart from "not configured yet".
pub struct CachedProjectStore<P> {
    provider: P,
    active: TtlLruCache<bool>,
    credential: TtlLruCache<String>,
}

impl<P: ProjectMetadataProvider> CachedProjectStore<P> {
    pub fn new(provider: P, config: &ProjectCacheConfig) -> Self {
        Self {
            provider,
            active: TtlLruCache::from_config(&config.active),
            credential: TtlLruCache::from_config(&config.credential),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn is_active(&self, project_id: &str) -> Result<bool> {
        if let Some(active) = self.active.get(project_id) {
            return Ok(active);
        }
        let active = self.provider.get_active(project_id).await?;
        debug!(project_id, active, "cached project active flag");
        self.active.set(project_id, active);
        Ok(active)
    }

    pub async fn credential(&self, project_id: &str) -> Result<String> {
        if let Some(secret) = self.credential.get(project_id) {
            return Ok(secret);
        }
        let secret = self.provider.get_credential(project_id).await?;
        if !secret.is_empty() {
            debug!(project_id, "cached project credential");
            self.credential.set(project_id, secret.clone());
        }
        Ok(secret)
    }

    /// Drop everything cached for `project_id`.
    pub fn invalidate(&self, project_id: &str) {
        let active = self.active.purge(project_id);
        let credential = self.credential.purge(project_id);
        if active || credential {
            debug!(project_id, "invalidated project metadata");
        }
    }

    /// React to a lifecycle notification. Every kind invalidates, so a
    /// project created after a cached `false` is seen immediately.
    pub fn on_event(&self, event: &ProjectEvent) {
        debug!(project_id = event.project_id(), event = event.kind(), "project event");
        self.invalidate(event.project_id());
    }

    pub fn stats(&self) -> ProjectCacheStats {
        ProjectCacheStats {
            active: self.active.stats(),
            credential: self.credential.stats(),
        }
    }
}
