//! Hot-path project metadata caching.
//!
//! Every proxied request needs the project's active flag and its upstream
//! credential. [`CachedProjectStore`] answers both from two independent
//! [`TtlLruCache`] instances and only falls through to the
//! [`ProjectMetadataProvider`] on a miss. [`ProjectGuard`] turns the active
//! flag into an allow/deny decision with an audit reason code.

mod guard;
mod project;
mod ttl_lru;

pub use guard::{DenyReason, GuardDecision, ProjectGuard};
pub use project::{
    CachedProjectStore, ProjectCacheStats, ProjectEvent, ProjectMetadataProvider,
};
pub use ttl_lru::{MetadataCacheStats, TtlLruCache};
