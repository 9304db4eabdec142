//! Mirror path resolution.
//!
//! # Responsibility
//! - Map one tree node to its absolute location under the storage root.
//!
//! # Invariants
//! - Paths are always derived from current tree state; nothing is cached,
//!   because an ancestor rename changes every descendant path.
//! - The root maps to the storage root itself.

use crate::model::node::{FileType, NodeId, NodeKind};
use crate::model::tree::{FileTree, TreeError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

pub type PathResult<T> = Result<T, PathError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Node id is not present in the tree.
    NotFound(NodeId),
    /// Tree links are inconsistent (e.g. a parent cycle).
    Tree(TreeError),
}

impl Display for PathError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "cannot resolve mirror path, node not found: {id}"),
            Self::Tree(err) => write!(f, "cannot resolve mirror path: {err}"),
        }
    }
}

impl Error for PathError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<TreeError> for PathError {
    fn from(value: TreeError) -> Self {
        match value {
            TreeError::NodeNotFound(id) => Self::NotFound(id),
            other => Self::Tree(other),
        }
    }
}

/// Node shape as seen by the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKind {
    Folder,
    File { file_type: FileType },
}

/// Absolute mirror location of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub kind: ResolvedKind,
    /// Directory or file path, suffix included for files.
    pub full_path: PathBuf,
    /// Directory that must exist before `full_path` can be written.
    pub parent_dir: PathBuf,
}

impl ResolvedPath {
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ResolvedKind::Folder)
    }

    pub fn file_type(&self) -> Option<FileType> {
        match self.kind {
            ResolvedKind::File { file_type } => Some(file_type),
            ResolvedKind::Folder => None,
        }
    }

    /// File extension for file nodes, empty for folders.
    pub fn suffix(&self) -> &'static str {
        self.file_type().map_or("", FileType::suffix)
    }

    /// Path this node would take in the same directory under `new_name`.
    pub fn sibling_with_name(&self, new_name: &str) -> ResolvedPath {
        ResolvedPath {
            kind: self.kind,
            full_path: self
                .parent_dir
                .join(format!("{new_name}{}", self.suffix())),
            parent_dir: self.parent_dir.clone(),
        }
    }
}

/// Resolves the absolute mirror path of `node_id` under `storage_root`.
pub fn resolve_path(tree: &FileTree, node_id: &NodeId, storage_root: &Path) -> PathResult<ResolvedPath> {
    let node = tree
        .get(node_id)
        .ok_or_else(|| PathError::NotFound(node_id.clone()))?;

    if node.id.is_root() {
        return Ok(ResolvedPath {
            kind: ResolvedKind::Folder,
            full_path: storage_root.to_path_buf(),
            parent_dir: storage_root
                .parent()
                .unwrap_or(storage_root)
                .to_path_buf(),
        });
    }

    let mut parent_dir = storage_root.to_path_buf();
    for segment in tree.ancestor_path(node_id)? {
        parent_dir.push(segment);
    }

    let (kind, file_name) = match node.kind {
        NodeKind::Folder { .. } => (ResolvedKind::Folder, node.name.clone()),
        NodeKind::File { file_type } => (
            ResolvedKind::File { file_type },
            format!("{}{}", node.name, file_type.suffix()),
        ),
    };

    Ok(ResolvedPath {
        kind,
        full_path: parent_dir.join(file_name),
        parent_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::{resolve_path, PathError, ResolvedKind};
    use crate::model::node::{FileType, NodeId, TreeNode};
    use crate::model::tree::FileTree;
    use std::path::Path;

    #[test]
    fn resolves_nested_note_with_markdown_suffix() {
        let mut tree = FileTree::new();
        let work = tree
            .add_node(&NodeId::root(), TreeNode::folder("Work"))
            .unwrap();
        let notes = tree
            .add_node(&work, TreeNode::file("Notes", FileType::Note))
            .unwrap();

        let resolved = resolve_path(&tree, &notes, Path::new("/mirror")).unwrap();
        assert_eq!(resolved.full_path, Path::new("/mirror/Work/Notes.md"));
        assert_eq!(resolved.parent_dir, Path::new("/mirror/Work"));
        assert_eq!(
            resolved.kind,
            ResolvedKind::File {
                file_type: FileType::Note
            }
        );
    }

    #[test]
    fn resolves_board_and_folder() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        let folder = tree.add_node(&root, TreeNode::folder("Sketches")).unwrap();
        let board = tree
            .add_node(&folder, TreeNode::file("Plan", FileType::Board))
            .unwrap();

        let folder_path = resolve_path(&tree, &folder, Path::new("/m")).unwrap();
        assert!(folder_path.is_folder());
        assert_eq!(folder_path.full_path, Path::new("/m/Sketches"));
        assert_eq!(folder_path.suffix(), "");

        let board_path = resolve_path(&tree, &board, Path::new("/m")).unwrap();
        assert_eq!(board_path.full_path, Path::new("/m/Sketches/Plan.excalidraw"));
    }

    #[test]
    fn rename_of_ancestor_is_reflected_without_touching_descendant() {
        let mut tree = FileTree::new();
        let work = tree
            .add_node(&NodeId::root(), TreeNode::folder("Work"))
            .unwrap();
        let notes = tree
            .add_node(&work, TreeNode::file("Notes", FileType::Note))
            .unwrap();

        tree.rename_node(&work, "Archive").unwrap();
        let resolved = resolve_path(&tree, &notes, Path::new("/root")).unwrap();
        assert_eq!(resolved.full_path, Path::new("/root/Archive/Notes.md"));
    }

    #[test]
    fn sibling_with_name_keeps_directory_and_suffix() {
        let mut tree = FileTree::new();
        let notes = tree
            .add_node(&NodeId::root(), TreeNode::file("Notes", FileType::Note))
            .unwrap();
        let resolved = resolve_path(&tree, &notes, Path::new("/m")).unwrap();
        let renamed = resolved.sibling_with_name("Journal");
        assert_eq!(renamed.full_path, Path::new("/m/Journal.md"));
        assert_eq!(renamed.parent_dir, resolved.parent_dir);
    }

    #[test]
    fn unknown_node_is_not_found() {
        let tree = FileTree::new();
        let missing = NodeId::new_file();
        let err = resolve_path(&tree, &missing, Path::new("/m")).unwrap_err();
        assert_eq!(err, PathError::NotFound(missing));
    }
}
