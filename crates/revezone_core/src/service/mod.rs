//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate tree, content and mirror calls into workspace intents.
//! - Keep UI/FFI layers decoupled from storage and filesystem details.

pub mod debounce;
pub mod sync_coordinator;
pub mod tree_service;
