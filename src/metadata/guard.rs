//! Allow/deny decision for project traffic.

use super::project::{CachedProjectStore, ProjectMetadataProvider};
use std::fmt;
use tracing::{debug, warn};

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// The project store could not be consulted.
    ServiceUnavailable,
    ProjectInactive,
}

impl DenyReason {
    /// Stable code for audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::ServiceUnavailable => "service_unavailable",
            DenyReason::ProjectInactive => "project_inactive",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(DenyReason),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Gate in front of the proxy: only active projects pass. Fails closed when
/// the project store errors.
pub struct ProjectGuard<'a, P> {
    store: &'a CachedProjectStore<P>,
}

impl<'a, P: ProjectMetadataProvider> ProjectGuard<'a, P> {
    pub fn new(store: &'a CachedProjectStore<P>) -> Self {
        Self { store }
    }

    pub async fn check(&self, project_id: &str) -> GuardDecision {
        match self.store.is_active(project_id).await {
            Ok(true) => GuardDecision::Allow,
            Ok(false) => {
                let reason = DenyReason::ProjectInactive;
                debug!(project_id, reason = reason.as_str(), "project denied");
                GuardDecision::Deny(reason)
            }
            Err(e) => {
                let reason = DenyReason::ServiceUnavailable;
                warn!(project_id, reason = reason.as_str(), error = %e, "project lookup failed");
                GuardDecision::Deny(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectCacheConfig;
    use crate::metadata::project::tests::FakeProvider;

    #[tokio::test]
    async fn test_decisions_and_reason_codes() {
        let store = CachedProjectStore::new(
            FakeProvider::default()
                .with_project("on", true, "sk")
                .with_project("off", false, "sk"),
            &ProjectCacheConfig::default(),
        );
        let guard = ProjectGuard::new(&store);

        assert_eq!(guard.check("on").await, GuardDecision::Allow);
        assert_eq!(
            guard.check("off").await,
            GuardDecision::Deny(DenyReason::ProjectInactive)
        );
        assert!(guard.check("on").await.is_allowed());

        *store.provider().fail.lock().unwrap() = true;
        assert_eq!(
            guard.check("unknown").await,
            GuardDecision::Deny(DenyReason::ServiceUnavailable)
        );
        // Cached decisions survive a provider outage.
        assert!(guard.check("on").await.is_allowed());

        assert_eq!(DenyReason::ServiceUnavailable.to_string(), "service_unavailable");
        assert_eq!(DenyReason::ProjectInactive.as_str(), "project_inactive");
    }
}
