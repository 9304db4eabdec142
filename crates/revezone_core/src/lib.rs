//! Core domain logic for the Revezone workspace.
//! The tree store and content stores are authoritative; the filesystem
//! mirror below the storage root is derived from them.

pub mod config;
pub mod db;
pub mod logging;
pub mod mirror;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use mirror::fs::{MirrorFs, NativeFs};
pub use mirror::path::{resolve_path, PathError, ResolvedKind, ResolvedPath};
pub use mirror::writer::{MirrorError, MirrorStatus, MirrorWriter, SkipReason, WriteMode};
pub use model::node::{FileType, NodeId, NodeKind, TreeNode};
pub use model::tree::{splice_children, FileTree, FolderDeleteMode, TreeError};
pub use repo::content_repo::{ContentError, ContentStore, SqliteContentStore};
pub use repo::tree_repo::{SqliteTreeRepository, TreeRepoError, TreeRepository};
pub use service::debounce::{ContentDebouncer, DEFAULT_CONTENT_DEBOUNCE};
pub use service::sync_coordinator::{
    ContentStores, MirrorOutcome, SyncCoordinator, SyncError, SyncReport, SyncResult,
};
pub use service::tree_service::{TreeStore, TreeStoreError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
