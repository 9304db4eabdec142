//! Tree Store: the authoritative, persisted workspace hierarchy.
//!
//! # Responsibility
//! - Load the tree once from its repository.
//! - Apply mutations and persist the whole tree after each one.
//!
//! # Invariants
//! - Every mutation is staged on a copy, saved, then swapped in. A failed
//!   validation or save leaves both memory and storage unchanged.

use crate::model::node::{NodeId, TreeNode};
use crate::model::tree::{FileTree, FolderDeleteMode, TreeError, TreeResult};
use crate::repo::tree_repo::{TreeRepoError, TreeRepository};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TreeStoreResult<T> = Result<T, TreeStoreError>;

/// Errors from tree store operations.
#[derive(Debug)]
pub enum TreeStoreError {
    /// Mutation rejected by tree validation.
    Tree(TreeError),
    /// Repository-level failure.
    Repo(TreeRepoError),
}

impl Display for TreeStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TreeStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<TreeError> for TreeStoreError {
    fn from(value: TreeError) -> Self {
        Self::Tree(value)
    }
}

impl From<TreeRepoError> for TreeStoreError {
    fn from(value: TreeRepoError) -> Self {
        Self::Repo(value)
    }
}

/// Persisted workspace tree facade.
pub struct TreeStore<R: TreeRepository> {
    repo: R,
    tree: FileTree,
}

impl<R: TreeRepository> TreeStore<R> {
    /// Loads the persisted tree from `repo`.
    pub fn load(repo: R) -> TreeStoreResult<Self> {
        let tree = repo.load_tree()?;
        info!(
            "event=tree_store_load module=service status=ok nodes={}",
            tree.len()
        );
        Ok(Self { repo, tree })
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Appends `node` to `parent_id`'s children.
    pub fn add_node(&mut self, parent_id: &NodeId, node: TreeNode) -> TreeStoreResult<NodeId> {
        self.commit(|tree| tree.add_node(parent_id, node))
    }

    /// Renames one node; fails on a sibling name collision.
    pub fn rename_node(&mut self, node_id: &NodeId, new_name: &str) -> TreeStoreResult<()> {
        self.commit(|tree| tree.rename_node(node_id, new_name))
    }

    /// Replaces the children order of one folder.
    pub fn reorder_children(
        &mut self,
        parent_id: &NodeId,
        ordered_ids: Vec<NodeId>,
    ) -> TreeStoreResult<()> {
        self.commit(|tree| tree.reorder_children(parent_id, ordered_ids))
    }

    /// Moves one node under `new_parent_id` at `index` (append when `None`).
    pub fn move_node(
        &mut self,
        node_id: &NodeId,
        new_parent_id: &NodeId,
        index: Option<usize>,
    ) -> TreeStoreResult<()> {
        self.commit(|tree| tree.move_node(node_id, new_parent_id, index))
    }

    /// Removes one node; returns removed nodes deepest-first.
    pub fn remove_node(
        &mut self,
        node_id: &NodeId,
        mode: FolderDeleteMode,
    ) -> TreeStoreResult<Vec<TreeNode>> {
        self.commit(|tree| tree.remove_node(node_id, mode))
    }

    fn commit<T>(&mut self, op: impl FnOnce(&mut FileTree) -> TreeResult<T>) -> TreeStoreResult<T> {
        let mut staged = self.tree.clone();
        let value = op(&mut staged)?;
        self.repo.save_tree(&staged)?;
        self.tree = staged;
        Ok(value)
    }
}
