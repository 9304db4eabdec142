//! Workspace tree node model.
//!
//! # Responsibility
//! - Define stable, kind-prefixed node identities.
//! - Define folder/file node shapes and file content types.
//! - Own display-name normalization rules shared by tree and mirror.
//!
//! # Invariants
//! - Folder ids start with `folder_`, file ids with `file_`; the root id is
//!   exactly `root` and is always a folder.
//! - A node name maps 1:1 to one on-disk path segment, so it never contains
//!   path separators or characters rejected by common filesystems.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ROOT_ID: &str = "root";
const FOLDER_ID_PREFIX: &str = "folder_";
const FILE_ID_PREFIX: &str = "file_";
const MAX_NAME_CHARS: usize = 255;

static INVALID_NAME_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1F]"#).expect("valid name regex"));

/// Stable identifier of one workspace tree node.
///
/// The prefix encodes the node kind so callers can branch on file vs folder
/// without loading the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Returns the id of the single tree root.
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Generates a new folder id.
    pub fn new_folder() -> Self {
        Self(format!("{FOLDER_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Generates a new file id.
    pub fn new_file() -> Self {
        Self(format!("{FILE_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Parses an externally supplied id, rejecting unknown prefixes.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed == ROOT_ID {
            return Some(Self::root());
        }
        let suffix = trimmed
            .strip_prefix(FOLDER_ID_PREFIX)
            .or_else(|| trimmed.strip_prefix(FILE_ID_PREFIX))?;
        if suffix.is_empty() || suffix.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Whether the id shape denotes a folder (root included).
    pub fn is_folder_id(&self) -> bool {
        self.is_root() || self.0.starts_with(FOLDER_ID_PREFIX)
    }

    /// Whether the id shape denotes a note/board file.
    pub fn is_file_id(&self) -> bool {
        self.0.starts_with(FILE_ID_PREFIX)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content type of a file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Markdown note.
    Note,
    /// Whiteboard scene stored as Excalidraw JSON.
    Board,
}

impl FileType {
    /// File extension used for the mirrored copy, including the dot.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Note => ".md",
            Self::Board => ".excalidraw",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Board => "board",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "note" => Some(Self::Note),
            "board" => Some(Self::Board),
            _ => None,
        }
    }

    /// Content written for a freshly created file.
    pub fn empty_content(self) -> &'static str {
        match self {
            Self::Note => "",
            Self::Board => {
                r#"{"type":"excalidraw","version":2,"source":"revezone","elements":[],"appState":{},"files":{}}"#
            }
        }
    }
}

/// Kind-specific node payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Folder with ordered child ids.
    Folder { children: Vec<NodeId> },
    /// Note or board file.
    File { file_type: FileType },
}

/// One entry of the workspace tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    /// User-facing label, also the on-disk path segment (without suffix).
    pub name: String,
    /// `None` only for the root, or for a node not yet attached.
    pub parent_id: Option<NodeId>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl TreeNode {
    /// Creates a detached, empty folder node with a generated id.
    pub fn folder(name: impl Into<String>) -> Self {
        Self::folder_with_id(NodeId::new_folder(), name)
    }

    pub fn folder_with_id(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: None,
            kind: NodeKind::Folder {
                children: Vec::new(),
            },
        }
    }

    /// Creates a detached file node with a generated id.
    pub fn file(name: impl Into<String>, file_type: FileType) -> Self {
        Self::file_with_id(NodeId::new_file(), name, file_type)
    }

    pub fn file_with_id(id: NodeId, name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: None,
            kind: NodeKind::File { file_type },
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder { .. })
    }

    /// Returns file type for file nodes.
    pub fn file_type(&self) -> Option<FileType> {
        match self.kind {
            NodeKind::File { file_type } => Some(file_type),
            NodeKind::Folder { .. } => None,
        }
    }

    /// Returns ordered children for folder nodes.
    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.kind {
            NodeKind::Folder { children } => Some(children.as_slice()),
            NodeKind::File { .. } => None,
        }
    }

    /// Persisted kind label (`folder|note|board`).
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            NodeKind::Folder { .. } => "folder",
            NodeKind::File { file_type } => file_type.as_str(),
        }
    }
}

/// Normalizes a user-supplied node name.
///
/// Returns `None` when the trimmed name is empty, a relative path marker,
/// too long, or contains characters that cannot appear in one path segment.
pub fn normalize_node_name(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return None;
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    if INVALID_NAME_CHARS_RE.is_match(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}
