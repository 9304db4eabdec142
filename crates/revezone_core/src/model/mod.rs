//! Workspace tree domain model.
//!
//! # Responsibility
//! - Define node identities, node kinds and file content types.
//! - Keep the in-memory hierarchy and its mutation rules in one place.
//!
//! # Invariants
//! - Every node is identified by a stable, kind-prefixed `NodeId`.
//! - Sibling names are unique within one folder.

pub mod node;
pub mod tree;
