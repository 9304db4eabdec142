//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for the tree and for
//!   note/board content.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repositories verify the migrated schema before first use (`try_new`).
//! - Repository APIs return semantic errors (`InvalidData`, kind mismatches)
//!   in addition to DB transport errors.

pub mod content_repo;
pub mod tree_repo;
