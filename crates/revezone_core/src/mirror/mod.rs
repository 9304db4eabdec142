//! Filesystem mirror of the workspace tree.
//!
//! The mirror is a derived, best-effort copy: folders become directories,
//! notes become `.md` files and boards become `.excalidraw` files below the
//! configured storage root.

pub mod fs;
pub mod path;
pub mod writer;
