//! Mirror writer: applies tree and content changes to the on-disk copy.
//!
//! # Responsibility
//! - Create, update, rename, relocate and remove mirror files/directories.
//! - Report what happened to each request as a `MirrorStatus`.
//!
//! # Invariants
//! - Only the exact resolved target is ever written or removed.
//! - Updates never create files; renames never overwrite.
//! - Directory removal is non-recursive.
//! - With no storage root configured every operation is `Disabled`.

use crate::mirror::fs::MirrorFs;
use crate::mirror::path::{resolve_path, PathError, ResolvedPath};
use crate::model::node::NodeId;
use crate::model::tree::FileTree;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Disk-level failures raised by mirror operations.
#[derive(Debug)]
pub enum MirrorError {
    /// Node could not be mapped to a mirror path.
    Path(PathError),
    /// Filesystem primitive failed.
    Io {
        op: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// Rename/relocate target is already occupied.
    DestinationExists(PathBuf),
    /// A directory about to be removed holds an entry no node maps to.
    UnexpectedEntry { dir: PathBuf, entry: PathBuf },
}

impl MirrorError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this is a non-recursive directory removal hitting entries.
    pub fn is_directory_not_empty(&self) -> bool {
        match self {
            Self::Io {
                op: "remove_dir",
                source,
                ..
            } => is_not_empty_os_error(source),
            Self::UnexpectedEntry { .. } => true,
            _ => false,
        }
    }
}

#[cfg(windows)]
fn is_not_empty_os_error(err: &io::Error) -> bool {
    // ERROR_DIR_NOT_EMPTY
    err.raw_os_error() == Some(145)
}

#[cfg(target_os = "macos")]
fn is_not_empty_os_error(err: &io::Error) -> bool {
    err.raw_os_error() == Some(66)
}

#[cfg(not(any(windows, target_os = "macos")))]
fn is_not_empty_os_error(err: &io::Error) -> bool {
    // ENOTEMPTY; some filesystems report EEXIST instead.
    matches!(err.raw_os_error(), Some(39) | Some(17))
}

impl Display for MirrorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(err) => write!(f, "{err}"),
            Self::Io { op, path, source } => {
                write!(f, "mirror {op} failed for {}: {source}", path.display())
            }
            Self::DestinationExists(path) => {
                write!(f, "mirror destination already exists: {}", path.display())
            }
            Self::UnexpectedEntry { dir, entry } => write!(
                f,
                "mirror directory {} is not empty: {} is not part of the workspace",
                dir.display(),
                entry.display()
            ),
        }
    }
}

impl Error for MirrorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Path(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::DestinationExists(_) | Self::UnexpectedEntry { .. } => None,
        }
    }
}

impl From<PathError> for MirrorError {
    fn from(value: PathError) -> Self {
        Self::Path(value)
    }
}

/// Why a mirror request was deliberately not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Update or removal target does not exist on disk.
    TargetMissing,
    /// Rename/relocate source does not exist on disk.
    SourceMissing,
}

/// Result of one mirror request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorStatus {
    Applied,
    Skipped(SkipReason),
    /// No storage root configured.
    Disabled,
    /// The intent has no disk effect (e.g. same-folder reorder).
    Unaffected,
}

impl MirrorStatus {
    /// Stable label used in logs and FFI envelopes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped(SkipReason::TargetMissing) => "skipped_target_missing",
            Self::Skipped(SkipReason::SourceMissing) => "skipped_source_missing",
            Self::Disabled => "disabled",
            Self::Unaffected => "unaffected",
        }
    }
}

/// Whether `create_or_update` may bring a new file into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Ensure the parent directory, then write.
    Create,
    /// Write only when the target already exists.
    Update,
}

/// Applies mirror operations below an optional storage root.
pub struct MirrorWriter<F: MirrorFs> {
    fs: F,
    storage_root: Option<PathBuf>,
}

impl<F: MirrorFs> MirrorWriter<F> {
    pub fn new(fs: F, storage_root: Option<PathBuf>) -> Self {
        Self { fs, storage_root }
    }

    /// Writer that reports `Disabled` for every request.
    pub fn disabled(fs: F) -> Self {
        Self::new(fs, None)
    }

    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_root.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.storage_root.is_some()
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    /// Resolves the current mirror path of one node; `None` when disabled.
    pub fn resolve(&self, tree: &FileTree, node_id: &NodeId) -> MirrorResult<Option<ResolvedPath>> {
        match self.storage_root.as_deref() {
            Some(root) => Ok(Some(resolve_path(tree, node_id, root)?)),
            None => Ok(None),
        }
    }

    /// Writes `content` to the mirror copy of one file node.
    pub fn create_or_update(
        &self,
        tree: &FileTree,
        node_id: &NodeId,
        content: &str,
        mode: WriteMode,
    ) -> MirrorResult<MirrorStatus> {
        let Some(resolved) = self.resolve(tree, node_id)? else {
            return Ok(MirrorStatus::Disabled);
        };

        match mode {
            WriteMode::Update => {
                if !self.fs.exists(&resolved.full_path) {
                    debug!(
                        "event=mirror_write module=mirror status=skip reason=target_missing node_id={node_id}"
                    );
                    return Ok(MirrorStatus::Skipped(SkipReason::TargetMissing));
                }
            }
            WriteMode::Create => {
                self.fs
                    .create_dir_all(&resolved.parent_dir)
                    .map_err(|err| MirrorError::io("create_dir_all", &resolved.parent_dir, err))?;
            }
        }

        self.fs
            .write(&resolved.full_path, content.as_bytes())
            .map_err(|err| MirrorError::io("write", &resolved.full_path, err))?;
        debug!(
            "event=mirror_write module=mirror status=ok node_id={node_id} bytes={} path={}",
            content.len(),
            resolved.full_path.display()
        );
        Ok(MirrorStatus::Applied)
    }

    /// Creates the mirror directory of one folder node.
    pub fn create_folder(&self, tree: &FileTree, node_id: &NodeId) -> MirrorResult<MirrorStatus> {
        let Some(resolved) = self.resolve(tree, node_id)? else {
            return Ok(MirrorStatus::Disabled);
        };
        self.fs
            .create_dir_all(&resolved.full_path)
            .map_err(|err| MirrorError::io("create_dir_all", &resolved.full_path, err))?;
        info!(
            "event=mirror_mkdir module=mirror status=ok node_id={node_id} path={}",
            resolved.full_path.display()
        );
        Ok(MirrorStatus::Applied)
    }

    /// Renames `old` in place to `new_name`, keeping its directory and suffix.
    ///
    /// `old` must be resolved before the tree rename is committed.
    pub fn rename(&self, old: &ResolvedPath, new_name: &str) -> MirrorResult<MirrorStatus> {
        let new = old.sibling_with_name(new_name);
        self.move_path("rename", old, &new)
    }

    /// Moves `old` to `new`, creating the destination directory if needed.
    pub fn relocate(&self, old: &ResolvedPath, new: &ResolvedPath) -> MirrorResult<MirrorStatus> {
        if old.full_path != new.full_path && self.fs.exists(&old.full_path) {
            self.fs
                .create_dir_all(&new.parent_dir)
                .map_err(|err| MirrorError::io("create_dir_all", &new.parent_dir, err))?;
        }
        self.move_path("relocate", old, new)
    }

    /// Removes the mirror copy of one node currently in `tree`.
    pub fn remove(&self, tree: &FileTree, node_id: &NodeId) -> MirrorResult<MirrorStatus> {
        match self.resolve(tree, node_id)? {
            Some(resolved) => self.remove_resolved(&resolved),
            None => Ok(MirrorStatus::Disabled),
        }
    }

    /// Removes one previously resolved path; directories must be empty.
    pub fn remove_resolved(&self, resolved: &ResolvedPath) -> MirrorResult<MirrorStatus> {
        let path = &resolved.full_path;
        if !self.fs.exists(path) {
            debug!(
                "event=mirror_remove module=mirror status=skip reason=target_missing path={}",
                path.display()
            );
            return Ok(MirrorStatus::Skipped(SkipReason::TargetMissing));
        }

        let removed = if resolved.is_folder() {
            self.fs
                .remove_dir(path)
                .map_err(|err| MirrorError::io("remove_dir", path, err))
        } else {
            self.fs
                .remove_file(path)
                .map_err(|err| MirrorError::io("remove_file", path, err))
        };
        if let Err(err) = removed {
            warn!(
                "event=mirror_remove module=mirror status=error path={} error={err}",
                path.display()
            );
            return Err(err);
        }

        info!(
            "event=mirror_remove module=mirror status=ok path={}",
            path.display()
        );
        Ok(MirrorStatus::Applied)
    }

    /// Fails when directory `dir` holds an entry outside `owned`.
    ///
    /// A missing directory passes.
    pub fn ensure_only_owned_entries(
        &self,
        dir: &ResolvedPath,
        owned: &HashSet<&Path>,
    ) -> MirrorResult<()> {
        let path = &dir.full_path;
        if !self.fs.exists(path) {
            return Ok(());
        }
        let entries = self
            .fs
            .read_dir(path)
            .map_err(|err| MirrorError::io("read_dir", path, err))?;
        match entries
            .into_iter()
            .find(|entry| !owned.contains(entry.as_path()))
        {
            Some(entry) => Err(MirrorError::UnexpectedEntry {
                dir: path.clone(),
                entry,
            }),
            None => Ok(()),
        }
    }

    /// Reads the mirror copy of one node; `None` when disabled or absent.
    pub fn read(&self, tree: &FileTree, node_id: &NodeId) -> MirrorResult<Option<Vec<u8>>> {
        let Some(resolved) = self.resolve(tree, node_id)? else {
            return Ok(None);
        };
        if !self.fs.exists(&resolved.full_path) {
            return Ok(None);
        }
        self.fs
            .read(&resolved.full_path)
            .map(Some)
            .map_err(|err| MirrorError::io("read", &resolved.full_path, err))
    }

    fn move_path(
        &self,
        op: &'static str,
        old: &ResolvedPath,
        new: &ResolvedPath,
    ) -> MirrorResult<MirrorStatus> {
        if old.full_path == new.full_path {
            return Ok(MirrorStatus::Unaffected);
        }
        if !self.fs.exists(&old.full_path) {
            debug!(
                "event=mirror_{op} module=mirror status=skip reason=source_missing path={}",
                old.full_path.display()
            );
            return Ok(MirrorStatus::Skipped(SkipReason::SourceMissing));
        }
        if self.fs.exists(&new.full_path) {
            warn!(
                "event=mirror_{op} module=mirror status=error reason=destination_exists path={}",
                new.full_path.display()
            );
            return Err(MirrorError::DestinationExists(new.full_path.clone()));
        }

        self.fs
            .rename(&old.full_path, &new.full_path)
            .map_err(|err| MirrorError::io(op, &old.full_path, err))?;
        info!(
            "event=mirror_{op} module=mirror status=ok from={} to={}",
            old.full_path.display(),
            new.full_path.display()
        );
        Ok(MirrorStatus::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::{MirrorError, MirrorStatus, MirrorWriter, SkipReason, WriteMode};
    use crate::mirror::fs::NativeFs;
    use crate::model::node::{FileType, NodeId, TreeNode};
    use crate::model::tree::FileTree;
    use std::fs;
    use std::io;

    #[test]
    fn disabled_writer_reports_disabled() {
        let mut tree = FileTree::new();
        let file = tree
            .add_node(&NodeId::root(), TreeNode::file("Notes", FileType::Note))
            .unwrap();
        let writer = MirrorWriter::disabled(NativeFs);

        let status = writer
            .create_or_update(&tree, &file, "x", WriteMode::Create)
            .unwrap();
        assert_eq!(status, MirrorStatus::Disabled);
        assert_eq!(writer.remove(&tree, &file).unwrap(), MirrorStatus::Disabled);
        assert!(writer.read(&tree, &file).unwrap().is_none());
    }

    #[test]
    fn update_on_missing_target_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = FileTree::new();
        let file = tree
            .add_node(&NodeId::root(), TreeNode::file("Notes", FileType::Note))
            .unwrap();
        let writer = MirrorWriter::new(NativeFs, Some(dir.path().to_path_buf()));

        let status = writer
            .create_or_update(&tree, &file, "late write", WriteMode::Update)
            .unwrap();
        assert_eq!(status, MirrorStatus::Skipped(SkipReason::TargetMissing));
        assert!(!dir.path().join("Notes.md").exists());
    }

    #[test]
    fn rename_never_overwrites_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = FileTree::new();
        let file = tree
            .add_node(&NodeId::root(), TreeNode::file("Draft", FileType::Note))
            .unwrap();
        let writer = MirrorWriter::new(NativeFs, Some(dir.path().to_path_buf()));
        writer
            .create_or_update(&tree, &file, "draft", WriteMode::Create)
            .unwrap();
        fs::write(dir.path().join("Final.md"), "foreign").unwrap();

        let old = writer.resolve(&tree, &file).unwrap().unwrap();
        let err = writer.rename(&old, "Final").unwrap_err();
        assert!(matches!(err, MirrorError::DestinationExists(_)));
        assert_eq!(fs::read_to_string(dir.path().join("Final.md")).unwrap(), "foreign");
        assert_eq!(fs::read_to_string(dir.path().join("Draft.md")).unwrap(), "draft");
    }

    #[test]
    fn directory_not_empty_is_detected() {
        let err = MirrorError::Io {
            op: "remove_dir",
            path: "/m/Work".into(),
            source: io::Error::from_raw_os_error(if cfg!(windows) {
                145
            } else if cfg!(target_os = "macos") {
                66
            } else {
                39
            }),
        };
        assert!(err.is_directory_not_empty());

        let other = MirrorError::Io {
            op: "remove_file",
            path: "/m/a.md".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!other.is_directory_not_empty());
    }

    #[test]
    fn status_labels_are_stable() {
        assert_eq!(MirrorStatus::Applied.as_str(), "applied");
        assert_eq!(
            MirrorStatus::Skipped(SkipReason::SourceMissing).as_str(),
            "skipped_source_missing"
        );
    }
}
