//! Sync coordinator: turns workspace intents into store and mirror effects.
//!
//! # Responsibility
//! - Sequence content store, tree store and mirror writer calls per intent.
//! - Debounce editor content writes per file.
//! - Report mirror problems as warnings next to the committed result.
//!
//! # Invariants
//! - Validation and authoritative store failures abort before any disk
//!   effect.
//! - Mirror failures never roll back a committed tree or content change.
//!   Folder deletes are the exception: their mirror directories are removed
//!   first and a failure there aborts the delete.
//! - Old mirror paths are always resolved before the tree mutation that
//!   changes them.
//! - A debounced write is only dropped by a cancel or by deleting its file;
//!   a failed store write is queued again.
//! - `&mut self` serializes intents, so a rename cannot race the next one.

use crate::mirror::fs::MirrorFs;
use crate::mirror::path::{PathError, ResolvedPath};
use crate::mirror::writer::{MirrorError, MirrorResult, MirrorStatus, MirrorWriter, WriteMode};
use crate::model::node::{FileType, NodeId, TreeNode};
use crate::model::tree::{FileTree, FolderDeleteMode, TreeError};
use crate::repo::content_repo::{ContentError, ContentStore};
use crate::repo::tree_repo::TreeRepository;
use crate::service::debounce::{ContentDebouncer, PendingContent};
use crate::service::tree_service::{TreeStore, TreeStoreError};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{Duration, Instant};

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors from sync coordinator intents.
#[derive(Debug)]
pub enum SyncError {
    /// Node does not exist; nothing was changed.
    NotFound(NodeId),
    /// A sibling already uses the requested name; nothing was changed.
    NameCollision { parent_id: NodeId, name: String },
    /// Content operation targeted a folder or a non-file id.
    NotAFile(NodeId),
    /// Other tree validation or persistence failure.
    Tree(TreeStoreError),
    /// Content store failure.
    Content(ContentError),
    /// Blocking mirror failure (folder delete staging).
    MirrorIo(MirrorError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "node not found: {id}"),
            Self::NameCollision { parent_id, name } => {
                write!(f, "name `{name}` already exists in folder {parent_id}")
            }
            Self::NotAFile(id) => write!(f, "node is not a file: {id}"),
            Self::Tree(err) => write!(f, "{err}"),
            Self::Content(err) => write!(f, "{err}"),
            Self::MirrorIo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Tree(err) => Some(err),
            Self::Content(err) => Some(err),
            Self::MirrorIo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TreeError> for SyncError {
    fn from(value: TreeError) -> Self {
        match value {
            TreeError::NodeNotFound(id) => Self::NotFound(id),
            TreeError::NameCollision { parent_id, name } => Self::NameCollision { parent_id, name },
            other => Self::Tree(TreeStoreError::Tree(other)),
        }
    }
}

impl From<TreeStoreError> for SyncError {
    fn from(value: TreeStoreError) -> Self {
        match value {
            TreeStoreError::Tree(err) => err.into(),
            other => Self::Tree(other),
        }
    }
}

impl From<ContentError> for SyncError {
    fn from(value: ContentError) -> Self {
        Self::Content(value)
    }
}

/// Mirror side of an intent that succeeded authoritatively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    Status(MirrorStatus),
    /// Non-fatal mirror failure; the mirror may diverge until re-synced.
    Failed(String),
}

impl MirrorOutcome {
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn status(&self) -> Option<MirrorStatus> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Failed(_) => None,
        }
    }

    /// Short label for envelopes: the status name or `failed`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Status(status) => status.as_str(),
            Self::Failed(_) => "failed",
        }
    }
}

/// Result of one committed intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Node the intent targeted (the parent for reorders).
    pub node_id: NodeId,
    pub mirror: MirrorOutcome,
    /// Removed node ids, deepest-first; empty for non-delete intents.
    pub removed: Vec<NodeId>,
}

impl SyncReport {
    fn new(node_id: NodeId, mirror: MirrorOutcome) -> Self {
        Self {
            node_id,
            mirror,
            removed: Vec::new(),
        }
    }
}

/// Board and note content stores.
pub struct ContentStores<C: ContentStore> {
    pub boards: C,
    pub notes: C,
}

impl<C: ContentStore> ContentStores<C> {
    pub fn new(boards: C, notes: C) -> Self {
        Self { boards, notes }
    }

    pub fn for_type(&self, file_type: FileType) -> &C {
        match file_type {
            FileType::Board => &self.boards,
            FileType::Note => &self.notes,
        }
    }
}

/// Coordinates tree store, content stores and mirror writer.
pub struct SyncCoordinator<R: TreeRepository, C: ContentStore, F: MirrorFs> {
    tree: TreeStore<R>,
    contents: ContentStores<C>,
    mirror: MirrorWriter<F>,
    debouncer: ContentDebouncer,
}

impl<R: TreeRepository, C: ContentStore, F: MirrorFs> SyncCoordinator<R, C, F> {
    pub fn new(tree: TreeStore<R>, contents: ContentStores<C>, mirror: MirrorWriter<F>) -> Self {
        Self {
            tree,
            contents,
            mirror,
            debouncer: ContentDebouncer::default(),
        }
    }

    /// Replaces the content debounce window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debouncer = ContentDebouncer::new(window);
        self
    }

    /// Adopts pending content carried over from an earlier coordinator.
    pub fn with_debouncer(mut self, debouncer: ContentDebouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    /// Consumes the coordinator, handing back its pending content.
    pub fn into_debouncer(self) -> ContentDebouncer {
        self.debouncer
    }

    pub fn tree(&self) -> &FileTree {
        self.tree.tree()
    }

    pub fn mirror(&self) -> &MirrorWriter<F> {
        &self.mirror
    }

    pub fn contents(&self) -> &ContentStores<C> {
        &self.contents
    }

    pub fn pending_content_len(&self) -> usize {
        self.debouncer.pending_len()
    }

    /// Creates a folder node and its mirror directory.
    pub fn create_folder(&mut self, parent_id: &NodeId, name: &str) -> SyncResult<SyncReport> {
        let node_id = self.tree.add_node(parent_id, TreeNode::folder(name))?;
        let status = self.mirror.create_folder(self.tree.tree(), &node_id);
        let mirror = mirror_outcome("create_folder", &node_id, status);
        info!(
            "event=sync_create module=service status=ok kind=folder node_id={node_id} mirror={}",
            mirror.label()
        );
        Ok(SyncReport::new(node_id, mirror))
    }

    /// Creates a file node with empty content under a fresh id.
    pub fn create_file(
        &mut self,
        parent_id: &NodeId,
        file_type: FileType,
        name: &str,
    ) -> SyncResult<SyncReport> {
        self.create_file_with_id(NodeId::new_file(), parent_id, file_type, name)
    }

    /// Creates a file node with a caller-chosen id.
    ///
    /// Order: empty content, tree node, mirror file. A tree failure removes
    /// the content row again.
    pub fn create_file_with_id(
        &mut self,
        node_id: NodeId,
        parent_id: &NodeId,
        file_type: FileType,
        name: &str,
    ) -> SyncResult<SyncReport> {
        if !node_id.is_file_id() {
            return Err(SyncError::NotAFile(node_id));
        }
        if self.tree.tree().contains(&node_id) {
            return Err(TreeError::DuplicateId(node_id).into());
        }
        self.tree
            .tree()
            .validate_new_child(parent_id, name, Some(file_type), None)?;

        let store = self.contents.for_type(file_type);
        let empty = file_type.empty_content();
        store.add_or_update(&node_id, empty)?;

        let node = TreeNode::file_with_id(node_id.clone(), name, file_type);
        if let Err(err) = self.tree.add_node(parent_id, node) {
            if let Err(cleanup) = store.delete(&node_id) {
                warn!(
                    "event=sync_create module=service status=error stage=content_cleanup node_id={node_id} error={cleanup}"
                );
            }
            return Err(err.into());
        }

        let status = self
            .mirror
            .create_or_update(self.tree.tree(), &node_id, empty, WriteMode::Create);
        let mirror = mirror_outcome("create_file", &node_id, status);
        info!(
            "event=sync_create module=service status=ok kind={} node_id={node_id} mirror={}",
            file_type.as_str(),
            mirror.label()
        );
        Ok(SyncReport::new(node_id, mirror))
    }

    /// Stores new content and refreshes an existing mirror copy.
    ///
    /// Any pending debounced write for the file is superseded.
    pub fn update_content(&mut self, file_id: &NodeId, content: &str) -> SyncResult<SyncReport> {
        let file_type = self.file_type_of(file_id)?;
        self.debouncer.cancel(file_id);
        self.write_content(file_id, file_type, content)
    }

    /// Reads authoritative content of one file node.
    pub fn read_content(&self, file_id: &NodeId) -> SyncResult<Option<String>> {
        let file_type = self.file_type_of(file_id)?;
        Ok(self.contents.for_type(file_type).get(file_id)?)
    }

    /// Records an editor change to be written once the window elapses.
    pub fn schedule_content_change(
        &mut self,
        file_id: &NodeId,
        content: impl Into<String>,
        now: Instant,
    ) -> SyncResult<()> {
        self.file_type_of(file_id)?;
        self.debouncer.schedule(file_id.clone(), content.into(), now);
        Ok(())
    }

    /// Writes every debounced change whose window has elapsed at `now`.
    pub fn flush_due_content(&mut self, now: Instant) -> Vec<SyncResult<SyncReport>> {
        let due = self.debouncer.take_due(now);
        self.flush(due)
    }

    /// Writes every pending change immediately.
    pub fn flush_all_content(&mut self) -> Vec<SyncResult<SyncReport>> {
        let pending = self.debouncer.take_all();
        self.flush(pending)
    }

    /// Drops the pending change of one file (editor unmount).
    pub fn cancel_content_change(&mut self, file_id: &NodeId) -> bool {
        let cancelled = self.debouncer.cancel(file_id);
        if cancelled {
            debug!("event=content_debounce module=service status=cancel node_id={file_id}");
        }
        cancelled
    }

    /// Renames one node and its mirror copy.
    pub fn rename(&mut self, node_id: &NodeId, new_name: &str) -> SyncResult<SyncReport> {
        self.tree.tree().node(node_id)?;
        let old = self.mirror.resolve(self.tree.tree(), node_id);

        self.tree.rename_node(node_id, new_name)?;
        let normalized = self.tree.tree().node(node_id)?.name.clone();

        let status = match old {
            Ok(Some(old)) => self.mirror.rename(&old, &normalized),
            Ok(None) => Ok(MirrorStatus::Disabled),
            Err(err) => Err(err),
        };
        let mirror = mirror_outcome("rename", node_id, status);
        info!(
            "event=sync_rename module=service status=ok node_id={node_id} mirror={}",
            mirror.label()
        );
        Ok(SyncReport::new(node_id.clone(), mirror))
    }

    /// Replaces the children order of one folder; never touches the mirror.
    pub fn reorder(&mut self, parent_id: &NodeId, ordered_ids: Vec<NodeId>) -> SyncResult<SyncReport> {
        self.tree.reorder_children(parent_id, ordered_ids)?;
        debug!("event=sync_reorder module=service status=ok parent_id={parent_id}");
        Ok(SyncReport::new(
            parent_id.clone(),
            MirrorOutcome::Status(MirrorStatus::Unaffected),
        ))
    }

    /// Moves one node; a parent change relocates its mirror copy.
    pub fn move_node(
        &mut self,
        node_id: &NodeId,
        new_parent_id: &NodeId,
        index: Option<usize>,
    ) -> SyncResult<SyncReport> {
        let old_parent_id = self.tree.tree().parent_id(node_id)?.cloned();
        let old = self.mirror.resolve(self.tree.tree(), node_id);

        self.tree.move_node(node_id, new_parent_id, index)?;

        if old_parent_id.as_ref() == Some(new_parent_id) {
            return Ok(SyncReport::new(
                node_id.clone(),
                MirrorOutcome::Status(MirrorStatus::Unaffected),
            ));
        }

        let status = old.and_then(|old| {
            let new = self.mirror.resolve(self.tree.tree(), node_id)?;
            match (old, new) {
                (Some(old), Some(new)) => self.mirror.relocate(&old, &new),
                _ => Ok(MirrorStatus::Disabled),
            }
        });
        let mirror = mirror_outcome("relocate", node_id, status);
        info!(
            "event=sync_move module=service status=ok node_id={node_id} parent_id={new_parent_id} mirror={}",
            mirror.label()
        );
        Ok(SyncReport::new(node_id.clone(), mirror))
    }

    /// Deletes one node with its content and mirror copy.
    pub fn delete(&mut self, node_id: &NodeId, mode: FolderDeleteMode) -> SyncResult<SyncReport> {
        if node_id.is_root() {
            return Err(TreeError::RootImmutable.into());
        }
        let node = self.tree.tree().node(node_id)?;
        if node.is_folder() {
            self.delete_folder(node_id, mode)
        } else {
            self.delete_file(node_id)
        }
    }

    /// Rewrites the mirror copy of one file from its stored content.
    pub fn mirror_file(&self, file_id: &NodeId) -> SyncResult<SyncReport> {
        let file_type = self.file_type_of(file_id)?;
        let status = self.rematerialize(file_id, file_type);
        Ok(SyncReport::new(
            file_id.clone(),
            mirror_outcome("mirror_file", file_id, status),
        ))
    }

    /// Rebuilds every mirror directory and file from the authoritative stores.
    pub fn mirror_all(&self) -> Vec<SyncReport> {
        let tree = self.tree.tree();
        let mut reports = Vec::with_capacity(tree.len());
        for (_, node) in tree.depth_first() {
            let status = match node.file_type() {
                Some(file_type) => self.rematerialize(&node.id, file_type),
                None => self.mirror.create_folder(tree, &node.id),
            };
            reports.push(SyncReport::new(
                node.id.clone(),
                mirror_outcome("mirror_all", &node.id, status),
            ));
        }
        info!(
            "event=mirror_rebuild module=service status=ok nodes={} warnings={}",
            reports.len(),
            reports
                .iter()
                .filter(|report| report.mirror.is_warning())
                .count()
        );
        reports
    }

    fn file_type_of(&self, file_id: &NodeId) -> SyncResult<FileType> {
        self.tree
            .tree()
            .node(file_id)?
            .file_type()
            .ok_or_else(|| SyncError::NotAFile(file_id.clone()))
    }

    fn write_content(
        &self,
        file_id: &NodeId,
        file_type: FileType,
        content: &str,
    ) -> SyncResult<SyncReport> {
        self.contents
            .for_type(file_type)
            .add_or_update(file_id, content)?;
        let status =
            self.mirror
                .create_or_update(self.tree.tree(), file_id, content, WriteMode::Update);
        let mirror = mirror_outcome("update_content", file_id, status);
        debug!(
            "event=content_update module=service status=ok node_id={file_id} bytes={} mirror={}",
            content.len(),
            mirror.label()
        );
        Ok(SyncReport::new(file_id.clone(), mirror))
    }

    /// Writes taken entries. Entries whose content store write failed are
    /// put back so a later flush retries them; entries for nodes that are no
    /// longer files are dropped.
    fn flush(&mut self, pending: Vec<PendingContent>) -> Vec<SyncResult<SyncReport>> {
        let mut results = Vec::with_capacity(pending.len());
        for item in pending {
            let result = self
                .file_type_of(&item.file_id)
                .and_then(|file_type| self.write_content(&item.file_id, file_type, &item.content));
            if let Err(SyncError::Content(ContentError::Db(err))) = &result {
                warn!(
                    "event=content_debounce module=service status=requeue node_id={} error={err}",
                    item.file_id
                );
                self.debouncer.requeue(item);
            }
            results.push(result);
        }
        results
    }

    fn rematerialize(&self, file_id: &NodeId, file_type: FileType) -> MirrorResult<MirrorStatus> {
        let stored = match self.contents.for_type(file_type).get(file_id) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    "event=mirror_rebuild module=service status=error node_id={file_id} error={err}"
                );
                None
            }
        };
        let content = stored.as_deref().unwrap_or(file_type.empty_content());
        self.mirror
            .create_or_update(self.tree.tree(), file_id, content, WriteMode::Create)
    }

    fn delete_file(&mut self, file_id: &NodeId) -> SyncResult<SyncReport> {
        let file_type = self.file_type_of(file_id)?;
        let old = self.mirror.resolve(self.tree.tree(), file_id);

        self.debouncer.cancel(file_id);
        if !self.contents.for_type(file_type).delete(file_id)? {
            debug!("event=sync_delete module=service status=skip stage=content reason=missing node_id={file_id}");
        }
        let removed = self.tree.remove_node(file_id, FolderDeleteMode::RejectNonEmpty)?;

        let status = match old {
            Ok(Some(old)) => self.mirror.remove_resolved(&old),
            Ok(None) => Ok(MirrorStatus::Disabled),
            Err(err) => Err(err),
        };
        let mirror = mirror_outcome("delete", file_id, status);
        info!(
            "event=sync_delete module=service status=ok kind={} node_id={file_id} mirror={}",
            file_type.as_str(),
            mirror.label()
        );
        Ok(SyncReport {
            node_id: file_id.clone(),
            mirror,
            removed: removed.into_iter().map(|node| node.id).collect(),
        })
    }

    fn delete_folder(&mut self, folder_id: &NodeId, mode: FolderDeleteMode) -> SyncResult<SyncReport> {
        let tree = self.tree.tree();
        let folder = tree.node(folder_id)?;
        if mode == FolderDeleteMode::RejectNonEmpty
            && folder.children().is_some_and(|children| !children.is_empty())
        {
            return Err(TreeError::FolderNotEmpty(folder_id.clone()).into());
        }

        // Pre-order subtree with the folder first; reversed it lists every
        // node before its ancestors.
        let mut subtree: Vec<&TreeNode> = vec![folder];
        subtree.extend(tree.descendants(folder_id)?);
        let files: Vec<(NodeId, FileType)> = subtree
            .iter()
            .filter_map(|node| node.file_type().map(|file_type| (node.id.clone(), file_type)))
            .collect();

        let status = self
            .stage_folder_mirror_removal(&subtree)
            .map_err(|err| {
                warn!(
                    "event=sync_delete module=service status=error stage=mirror node_id={folder_id} error={err}"
                );
                match err {
                    MirrorError::Path(PathError::NotFound(id)) => SyncError::NotFound(id),
                    other => SyncError::MirrorIo(other),
                }
            })?;

        for (file_id, file_type) in &files {
            self.debouncer.cancel(file_id);
            if !self.contents.for_type(*file_type).delete(file_id)? {
                debug!("event=sync_delete module=service status=skip stage=content reason=missing node_id={file_id}");
            }
        }
        let removed = self.tree.remove_node(folder_id, mode)?;

        info!(
            "event=sync_delete module=service status=ok kind=folder node_id={folder_id} removed={} mirror={}",
            removed.len(),
            status.as_str()
        );
        Ok(SyncReport {
            node_id: folder_id.clone(),
            mirror: MirrorOutcome::Status(status),
            removed: removed.into_iter().map(|node| node.id).collect(),
        })
    }

    /// Removes mirror files, then directories deepest-first.
    ///
    /// Every directory is checked for entries outside the subtree before
    /// anything is removed. Returns the status of the folder directory itself.
    fn stage_folder_mirror_removal(&self, subtree: &[&TreeNode]) -> MirrorResult<MirrorStatus> {
        let tree = self.tree.tree();
        let mut resolved: Vec<ResolvedPath> = Vec::with_capacity(subtree.len());
        for node in subtree {
            match self.mirror.resolve(tree, &node.id)? {
                Some(path) => resolved.push(path),
                None => return Ok(MirrorStatus::Disabled),
            }
        }

        let owned: HashSet<&Path> = resolved.iter().map(|path| path.full_path.as_path()).collect();
        for dir in resolved.iter().filter(|path| path.is_folder()) {
            self.mirror.ensure_only_owned_entries(dir, &owned)?;
        }

        for path in resolved.iter().filter(|path| !path.is_folder()) {
            self.mirror.remove_resolved(path)?;
        }
        let mut folder_status = MirrorStatus::Unaffected;
        for path in resolved.iter().rev().filter(|path| path.is_folder()) {
            folder_status = self.mirror.remove_resolved(path)?;
        }
        Ok(folder_status)
    }
}

fn mirror_outcome(
    op: &'static str,
    node_id: &NodeId,
    result: MirrorResult<MirrorStatus>,
) -> MirrorOutcome {
    match result {
        Ok(status) => MirrorOutcome::Status(status),
        Err(err) => {
            warn!(
                "event=mirror_sync module=service status=error op={op} node_id={node_id} error={err}"
            );
            MirrorOutcome::Failed(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MirrorOutcome, SyncError};
    use crate::mirror::writer::{MirrorStatus, SkipReason};
    use crate::model::node::NodeId;
    use crate::model::tree::TreeError;
    use crate::service::tree_service::TreeStoreError;

    #[test]
    fn tree_errors_map_to_semantic_variants() {
        let id = NodeId::new_file();
        assert!(matches!(
            SyncError::from(TreeError::NodeNotFound(id.clone())),
            SyncError::NotFound(found) if found == id
        ));
        assert!(matches!(
            SyncError::from(TreeStoreError::Tree(TreeError::NameCollision {
                parent_id: NodeId::root(),
                name: "Notes".to_string(),
            })),
            SyncError::NameCollision { ref name, .. } if name == "Notes"
        ));
        assert!(matches!(
            SyncError::from(TreeError::RootImmutable),
            SyncError::Tree(TreeStoreError::Tree(TreeError::RootImmutable))
        ));
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(
            MirrorOutcome::Status(MirrorStatus::Skipped(SkipReason::TargetMissing)).label(),
            "skipped_target_missing"
        );
        let failed = MirrorOutcome::Failed("disk full".to_string());
        assert!(failed.is_warning());
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.status(), None);
    }
}
