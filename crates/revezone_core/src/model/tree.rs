//! In-memory workspace tree.
//!
//! # Responsibility
//! - Hold the single-rooted folder/file hierarchy with ordered children.
//! - Validate and apply add/rename/reorder/move/remove mutations.
//! - Answer ancestor and subtree queries for path resolution.
//!
//! # Invariants
//! - Sibling names are unique per folder (case-sensitive).
//! - Every non-root node has exactly one parent, recorded both in the
//!   parent's `children` and in the node's `parent_id`.
//! - A failed mutation leaves the tree untouched: all checks run before the
//!   first write.
//! - Mutations preserve the relative order of unaffected siblings.

use crate::model::node::{normalize_node_name, FileType, NodeId, NodeKind, TreeNode};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TreeResult<T> = Result<T, TreeError>;

/// Validation errors raised by tree mutations and lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Target node does not exist.
    NodeNotFound(NodeId),
    /// Parent node does not exist.
    ParentNotFound(NodeId),
    /// Parent exists but is a file.
    ParentMustBeFolder(NodeId),
    /// A node with this id is already attached.
    DuplicateId(NodeId),
    /// Id prefix does not match the node kind.
    IdKindMismatch(NodeId),
    /// Name is blank or cannot be used as a path segment.
    InvalidName(String),
    /// A sibling with the same name already exists.
    NameCollision { parent_id: NodeId, name: String },
    /// The root cannot be renamed, moved or removed.
    RootImmutable,
    /// Move would place a folder inside itself.
    CycleDetected { node_id: NodeId, parent_id: NodeId },
    /// Folder still has children and cascade was not requested.
    FolderNotEmpty(NodeId),
    /// Reorder input is not a permutation of current children.
    InvalidReorder {
        parent_id: NodeId,
        reason: &'static str,
    },
    /// New folder nodes must be attached without children.
    UnexpectedChildren(NodeId),
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "tree node not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "tree parent not found: {id}"),
            Self::ParentMustBeFolder(id) => write!(f, "tree parent must be folder: {id}"),
            Self::DuplicateId(id) => write!(f, "tree node already exists: {id}"),
            Self::IdKindMismatch(id) => write!(f, "tree node id does not match its kind: {id}"),
            Self::InvalidName(name) => write!(f, "invalid node name: `{name}`"),
            Self::NameCollision { parent_id, name } => {
                write!(f, "name `{name}` already exists in folder {parent_id}")
            }
            Self::RootImmutable => write!(f, "tree root cannot be modified"),
            Self::CycleDetected { node_id, parent_id } => write!(
                f,
                "move would create cycle: node {node_id} under parent {parent_id}"
            ),
            Self::FolderNotEmpty(id) => write!(f, "folder is not empty: {id}"),
            Self::InvalidReorder { parent_id, reason } => {
                write!(f, "invalid reorder of folder {parent_id}: {reason}")
            }
            Self::UnexpectedChildren(id) => {
                write!(f, "new folder must not carry children: {id}")
            }
        }
    }
}

impl Error for TreeError {}

/// How `remove_node` treats folders that still have children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FolderDeleteMode {
    /// Fail with `FolderNotEmpty` when the folder has children.
    #[default]
    RejectNonEmpty,
    /// Remove the folder together with its whole subtree.
    Cascade,
}

/// Workspace hierarchy keyed by node id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTree {
    nodes: HashMap<NodeId, TreeNode>,
}

impl Default for FileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTree {
    /// Creates a tree holding only the root folder.
    pub fn new() -> Self {
        let root = TreeNode::folder_with_id(NodeId::root(), "");
        let mut nodes = HashMap::new();
        nodes.insert(root.id.clone(), root);
        Self { nodes }
    }

    /// Number of nodes, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Loads one node or fails with `NodeNotFound`.
    pub fn node(&self, id: &NodeId) -> TreeResult<&TreeNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))
    }

    /// Unordered iteration over all nodes, root included.
    pub fn iter(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    /// Ordered children of one folder.
    pub fn children(&self, folder_id: &NodeId) -> TreeResult<&[NodeId]> {
        let folder = self
            .nodes
            .get(folder_id)
            .ok_or_else(|| TreeError::ParentNotFound(folder_id.clone()))?;
        folder
            .children()
            .ok_or_else(|| TreeError::ParentMustBeFolder(folder_id.clone()))
    }

    pub fn parent_id(&self, id: &NodeId) -> TreeResult<Option<&NodeId>> {
        Ok(self.node(id)?.parent_id.as_ref())
    }

    /// Ancestors from the first level below root down to the direct parent.
    ///
    /// The root itself is never included; it maps to the storage root.
    pub fn ancestors(&self, id: &NodeId) -> TreeResult<Vec<&TreeNode>> {
        let mut chain = Vec::new();
        let mut cursor = self.node(id)?.parent_id.as_ref();
        while let Some(parent_id) = cursor {
            let parent = self.node(parent_id)?;
            if parent.id.is_root() {
                break;
            }
            // A well-formed tree cannot be deeper than its node count.
            if chain.len() > self.nodes.len() {
                return Err(TreeError::CycleDetected {
                    node_id: id.clone(),
                    parent_id: parent_id.clone(),
                });
            }
            chain.push(parent);
            cursor = parent.parent_id.as_ref();
        }
        chain.reverse();
        Ok(chain)
    }

    /// Names of all ancestors below root, outermost first.
    pub fn ancestor_path(&self, id: &NodeId) -> TreeResult<Vec<&str>> {
        Ok(self
            .ancestors(id)?
            .into_iter()
            .map(|node| node.name.as_str())
            .collect())
    }

    /// Pre-order descendants of one node, the node itself excluded.
    pub fn descendants(&self, id: &NodeId) -> TreeResult<Vec<&TreeNode>> {
        let mut out = Vec::new();
        let mut stack: Vec<&NodeId> = self
            .node(id)?
            .children()
            .map(|children| children.iter().rev().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            let node = self.node(current)?;
            if let Some(children) = node.children() {
                stack.extend(children.iter().rev());
            }
            out.push(node);
        }
        Ok(out)
    }

    /// Depth-first walk of the whole tree with depth (top level = 0).
    pub fn depth_first(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, &NodeId)> = Vec::new();
        if let Ok(children) = self.children(&NodeId::root()) {
            stack.extend(children.iter().rev().map(|id| (0, id)));
        }
        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if let Some(children) = node.children() {
                stack.extend(children.iter().rev().map(|child| (depth + 1, child)));
            }
            out.push((depth, node));
        }
        out
    }

    /// Checks that `name` can be used for a child of `parent_id`.
    ///
    /// `file_type` is the candidate's kind (`None` for a folder). Besides
    /// equal names, a name whose mirror entry (`name` plus suffix) equals a
    /// sibling's mirror entry collides too, e.g. folder `Notes.md` and note
    /// `Notes`. `exclude` skips one sibling, so a node can keep its own name.
    /// Returns the normalized name.
    pub fn validate_new_child(
        &self,
        parent_id: &NodeId,
        name: &str,
        file_type: Option<FileType>,
        exclude: Option<&NodeId>,
    ) -> TreeResult<String> {
        let children = self.children(parent_id)?;
        let normalized =
            normalize_node_name(name).ok_or_else(|| TreeError::InvalidName(name.to_string()))?;
        let entry = mirror_entry_name(&normalized, file_type);
        for child_id in children {
            if Some(child_id) == exclude {
                continue;
            }
            let sibling = self.node(child_id)?;
            if sibling.name == normalized
                || mirror_entry_name(&sibling.name, sibling.file_type()) == entry
            {
                return Err(TreeError::NameCollision {
                    parent_id: parent_id.clone(),
                    name: normalized,
                });
            }
        }
        Ok(normalized)
    }

    /// Appends a detached node to the end of `parent_id`'s children.
    pub fn add_node(&mut self, parent_id: &NodeId, mut node: TreeNode) -> TreeResult<NodeId> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateId(node.id));
        }
        match &node.kind {
            NodeKind::Folder { children } => {
                if !node.id.is_folder_id() {
                    return Err(TreeError::IdKindMismatch(node.id));
                }
                if !children.is_empty() {
                    return Err(TreeError::UnexpectedChildren(node.id));
                }
            }
            NodeKind::File { .. } => {
                if !node.id.is_file_id() {
                    return Err(TreeError::IdKindMismatch(node.id));
                }
            }
        }

        node.name = self.validate_new_child(parent_id, &node.name, node.file_type(), None)?;
        node.parent_id = Some(parent_id.clone());
        let id = node.id.clone();

        self.children_mut(parent_id)?.push(id.clone());
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Renames one node; renaming to its current name is a no-op.
    pub fn rename_node(&mut self, id: &NodeId, new_name: &str) -> TreeResult<()> {
        let parent_id = self.attached_parent(id)?;
        let file_type = self.node(id)?.file_type();
        let normalized = self.validate_new_child(&parent_id, new_name, file_type, Some(id))?;
        if let Some(node) = self.nodes.get_mut(id) {
            node.name = normalized;
        }
        Ok(())
    }

    /// Replaces the full children sequence of one folder.
    ///
    /// `ordered_ids` must contain exactly the current children.
    pub fn reorder_children(&mut self, parent_id: &NodeId, ordered_ids: Vec<NodeId>) -> TreeResult<()> {
        let current = self.children(parent_id)?;
        if ordered_ids.len() != current.len() {
            return Err(TreeError::InvalidReorder {
                parent_id: parent_id.clone(),
                reason: "children count mismatch",
            });
        }
        let unique: HashSet<&NodeId> = ordered_ids.iter().collect();
        if unique.len() != ordered_ids.len() {
            return Err(TreeError::InvalidReorder {
                parent_id: parent_id.clone(),
                reason: "duplicate child ids",
            });
        }
        if current.iter().any(|id| !unique.contains(id)) {
            return Err(TreeError::InvalidReorder {
                parent_id: parent_id.clone(),
                reason: "ids do not match current children",
            });
        }

        *self.children_mut(parent_id)? = ordered_ids;
        Ok(())
    }

    /// Moves one node under `new_parent_id` at `index`.
    ///
    /// `index` is applied to the target children after the moved node has
    /// been pruned from them; `None` appends.
    pub fn move_node(
        &mut self,
        id: &NodeId,
        new_parent_id: &NodeId,
        index: Option<usize>,
    ) -> TreeResult<()> {
        let old_parent_id = self.attached_parent(id)?;
        let target_children = self.children(new_parent_id)?;

        if new_parent_id == id || self.would_create_cycle(id, new_parent_id)? {
            return Err(TreeError::CycleDetected {
                node_id: id.clone(),
                parent_id: new_parent_id.clone(),
            });
        }

        let moved = std::slice::from_ref(id);
        if old_parent_id == *new_parent_id {
            let index = index.unwrap_or(target_children.len());
            let reordered = splice_children(target_children, moved, index);
            *self.children_mut(new_parent_id)? = reordered;
            return Ok(());
        }

        let node = self.node(id)?;
        let (name, file_type) = (node.name.clone(), node.file_type());
        self.validate_new_child(new_parent_id, &name, file_type, None)?;

        let index = index.unwrap_or(target_children.len());
        let reordered = splice_children(target_children, moved, index);
        self.children_mut(&old_parent_id)?
            .retain(|child| child != id);
        *self.children_mut(new_parent_id)? = reordered;
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent_id = Some(new_parent_id.clone());
        }
        Ok(())
    }

    /// Detaches and drops one node.
    ///
    /// Returns the removed nodes deepest-first, the target itself last.
    pub fn remove_node(&mut self, id: &NodeId, mode: FolderDeleteMode) -> TreeResult<Vec<TreeNode>> {
        let parent_id = self.attached_parent(id)?;
        let node = self.node(id)?;
        if mode == FolderDeleteMode::RejectNonEmpty
            && node.children().is_some_and(|children| !children.is_empty())
        {
            return Err(TreeError::FolderNotEmpty(id.clone()));
        }

        let mut order: Vec<NodeId> = self
            .descendants(id)?
            .into_iter()
            .map(|node| node.id.clone())
            .collect();
        order.reverse();
        order.push(id.clone());

        self.children_mut(&parent_id)?
            .retain(|child| child != id);
        Ok(order
            .into_iter()
            .filter_map(|removed| self.nodes.remove(&removed))
            .collect())
    }

    fn attached_parent(&self, id: &NodeId) -> TreeResult<NodeId> {
        if id.is_root() {
            return Err(TreeError::RootImmutable);
        }
        self.node(id)?
            .parent_id
            .clone()
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))
    }

    fn children_mut(&mut self, folder_id: &NodeId) -> TreeResult<&mut Vec<NodeId>> {
        let folder = self
            .nodes
            .get_mut(folder_id)
            .ok_or_else(|| TreeError::ParentNotFound(folder_id.clone()))?;
        match &mut folder.kind {
            NodeKind::Folder { children } => Ok(children),
            NodeKind::File { .. } => Err(TreeError::ParentMustBeFolder(folder_id.clone())),
        }
    }

    fn would_create_cycle(&self, node_id: &NodeId, candidate_parent: &NodeId) -> TreeResult<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent);
        while let Some(current) = cursor {
            if current == node_id || !visited.insert(current) {
                return Ok(true);
            }
            cursor = self.node(current)?.parent_id.as_ref();
        }
        Ok(false)
    }
}

/// Directory entry a node occupies in its parent's mirror directory.
fn mirror_entry_name(name: &str, file_type: Option<FileType>) -> String {
    match file_type {
        Some(file_type) => format!("{name}{}", file_type.suffix()),
        None => name.to_string(),
    }
}

/// Drag-and-drop splice: prunes `moved` from `children`, then inserts the
/// moved ids at `index` of the pruned list (clamped to its length).
pub fn splice_children(children: &[NodeId], moved: &[NodeId], index: usize) -> Vec<NodeId> {
    let mut unique_moved: Vec<NodeId> = Vec::with_capacity(moved.len());
    for id in moved {
        if !unique_moved.contains(id) {
            unique_moved.push(id.clone());
        }
    }

    let mut pruned: Vec<NodeId> = children
        .iter()
        .filter(|child| !unique_moved.contains(child))
        .cloned()
        .collect();
    let at = index.min(pruned.len());
    pruned.splice(at..at, unique_moved);
    pruned
}

#[cfg(test)]
mod tests {
    use super::{splice_children, FileTree, FolderDeleteMode, TreeError};
    use crate::model::node::{FileType, NodeId, TreeNode};

    fn ids(count: usize) -> Vec<NodeId> {
        (0..count).map(|_| NodeId::new_file()).collect()
    }

    #[test]
    fn splice_moves_last_item_before_target_index() {
        let items = ids(3);
        let (a, b, c) = (items[0].clone(), items[1].clone(), items[2].clone());
        let result = splice_children(&items, &[c.clone()], 1);
        assert_eq!(result, vec![a, c, b]);
    }

    #[test]
    fn splice_index_is_computed_on_pruned_list() {
        let items = ids(3);
        let (a, b, c) = (items[0].clone(), items[1].clone(), items[2].clone());
        let result = splice_children(&items, &[a.clone()], 2);
        assert_eq!(result, vec![b, c, a]);
    }

    #[test]
    fn splice_clamps_index_and_ignores_duplicate_moved_ids() {
        let items = ids(2);
        let (a, b) = (items[0].clone(), items[1].clone());
        let result = splice_children(&items, &[a.clone(), a.clone()], 99);
        assert_eq!(result, vec![b, a]);
    }

    #[test]
    fn add_rejects_sibling_name_collision_without_mutation() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        tree.add_node(&root, TreeNode::file("Notes", FileType::Note))
            .unwrap();
        let before = tree.clone();

        let err = tree
            .add_node(&root, TreeNode::file("Notes", FileType::Board))
            .unwrap_err();
        assert!(matches!(err, TreeError::NameCollision { ref name, .. } if name == "Notes"));
        assert_eq!(tree, before);
    }

    #[test]
    fn names_sharing_a_mirror_entry_collide() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        let notes = tree
            .add_node(&root, TreeNode::file("Notes", FileType::Note))
            .unwrap();
        let other = tree.add_node(&root, TreeNode::folder("Other")).unwrap();

        let err = tree
            .add_node(&root, TreeNode::folder("Notes.md"))
            .unwrap_err();
        assert!(matches!(err, TreeError::NameCollision { ref name, .. } if name == "Notes.md"));
        assert!(matches!(
            tree.rename_node(&other, "Notes.md"),
            Err(TreeError::NameCollision { .. })
        ));

        // Same base name with a different suffix maps to a different entry.
        tree.add_node(&root, TreeNode::folder("Notes.excalidraw"))
            .unwrap();
        let sketch = tree
            .add_node(&other, TreeNode::file("Notes.md", FileType::Board))
            .unwrap();
        tree.rename_node(&notes, "Moved").unwrap();
        tree.add_node(&root, TreeNode::folder("Notes.md")).unwrap();
        assert!(matches!(
            tree.move_node(&sketch, &root, None),
            Err(TreeError::NameCollision { .. })
        ));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        tree.add_node(&root, TreeNode::folder("Work")).unwrap();
        tree.add_node(&root, TreeNode::folder("work")).unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn add_rejects_id_kind_mismatch() {
        let mut tree = FileTree::new();
        let node = TreeNode::file_with_id(NodeId::new_folder(), "x", FileType::Note);
        let err = tree.add_node(&NodeId::root(), node).unwrap_err();
        assert!(matches!(err, TreeError::IdKindMismatch(_)));
    }

    #[test]
    fn rename_to_own_name_is_allowed_but_sibling_name_is_not() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        let a = tree.add_node(&root, TreeNode::folder("A")).unwrap();
        tree.add_node(&root, TreeNode::folder("B")).unwrap();

        tree.rename_node(&a, " A ").unwrap();
        let err = tree.rename_node(&a, "B").unwrap_err();
        assert!(matches!(err, TreeError::NameCollision { .. }));
        assert_eq!(tree.node(&a).unwrap().name, "A");
    }

    #[test]
    fn move_into_descendant_is_rejected() {
        let mut tree = FileTree::new();
        let outer = tree
            .add_node(&NodeId::root(), TreeNode::folder("Outer"))
            .unwrap();
        let inner = tree.add_node(&outer, TreeNode::folder("Inner")).unwrap();

        let err = tree.move_node(&outer, &inner, None).unwrap_err();
        assert!(matches!(err, TreeError::CycleDetected { .. }));
    }

    #[test]
    fn cross_folder_move_updates_parent_links() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        let left = tree.add_node(&root, TreeNode::folder("Left")).unwrap();
        let right = tree.add_node(&root, TreeNode::folder("Right")).unwrap();
        let file = tree
            .add_node(&left, TreeNode::file("Doc", FileType::Note))
            .unwrap();

        tree.move_node(&file, &right, Some(0)).unwrap();
        assert!(tree.children(&left).unwrap().is_empty());
        assert_eq!(tree.children(&right).unwrap(), &[file.clone()]);
        assert_eq!(tree.parent_id(&file).unwrap(), Some(&right));
        assert_eq!(tree.ancestor_path(&file).unwrap(), vec!["Right"]);
    }

    #[test]
    fn remove_non_empty_folder_requires_cascade() {
        let mut tree = FileTree::new();
        let folder = tree
            .add_node(&NodeId::root(), TreeNode::folder("Work"))
            .unwrap();
        let nested = tree.add_node(&folder, TreeNode::folder("Nested")).unwrap();
        let file = tree
            .add_node(&nested, TreeNode::file("Doc", FileType::Board))
            .unwrap();

        let err = tree
            .remove_node(&folder, FolderDeleteMode::RejectNonEmpty)
            .unwrap_err();
        assert_eq!(err, TreeError::FolderNotEmpty(folder.clone()));

        let removed = tree.remove_node(&folder, FolderDeleteMode::Cascade).unwrap();
        let removed_ids: Vec<_> = removed.into_iter().map(|node| node.id).collect();
        assert_eq!(removed_ids, vec![file, nested, folder]);
        assert!(tree.is_empty());
    }

    #[test]
    fn root_is_immutable() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        assert_eq!(tree.rename_node(&root, "x"), Err(TreeError::RootImmutable));
        assert_eq!(
            tree.remove_node(&root, FolderDeleteMode::Cascade).unwrap_err(),
            TreeError::RootImmutable
        );
    }

    #[test]
    fn depth_first_follows_children_order() {
        let mut tree = FileTree::new();
        let root = NodeId::root();
        let work = tree.add_node(&root, TreeNode::folder("Work")).unwrap();
        tree.add_node(&work, TreeNode::file("Notes", FileType::Note))
            .unwrap();
        tree.add_node(&root, TreeNode::file("Sketch", FileType::Board))
            .unwrap();

        let walk: Vec<_> = tree
            .depth_first()
            .into_iter()
            .map(|(depth, node)| (depth, node.name.as_str()))
            .collect();
        assert_eq!(walk, vec![(0, "Work"), (1, "Notes"), (0, "Sketch")]);
    }
}
