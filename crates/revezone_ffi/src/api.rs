//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose workspace intents (create, rename, reorder, move, delete, edit)
//!   to Dart via FRB.
//! - Translate core errors and mirror warnings into flat envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Calls are serialized by one process-wide lock; each call opens the
//!   database, loads the tree and applies one intent.
//! - Pending editor content lives behind that lock and is lent to each
//!   call's coordinator; it is never dropped because a call failed.
//! - Node ids cross the boundary as their string form; `None` or `"root"`
//!   as a parent means the workspace root.

use log::{info, warn};
use revezone_core::{
    core_version as core_version_inner, init_logging as init_logging_inner,
    init_logging_from_config, open_db, ping as ping_inner, ContentDebouncer, ContentStores,
    CoreConfig, FileType, FolderDeleteMode, MirrorOutcome, MirrorWriter, NativeFs, NodeId,
    SqliteContentStore, SqliteTreeRepository, SyncCoordinator, SyncReport, TreeStore,
};
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Instant;

static FFI_CONFIG: OnceLock<CoreConfig> = OnceLock::new();
/// Serializes workspace calls and holds pending editor content between them.
static WORKSPACE: Mutex<Option<ContentDebouncer>> = Mutex::new(None);

type FfiCoordinator<'conn> =
    SyncCoordinator<SqliteTreeRepository<'conn>, SqliteContentStore<'conn>, NativeFs>;

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// When `REVEZONE_LOG_DIR` is set, the first workspace call already starts
/// logging from the environment; a later call here must then match it.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Action response envelope for tree and content intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeActionResponse {
    /// Whether the authoritative change was committed.
    pub ok: bool,
    /// Target node id (parent id for reorders).
    pub node_id: Option<String>,
    /// Mirror outcome label, e.g. `applied`, `skipped_target_missing`,
    /// `disabled`, `failed`.
    pub mirror: Option<String>,
    /// Human-readable message; carries the mirror warning when one occurred.
    pub message: String,
    /// Ids removed by a delete, deepest-first.
    pub removed_ids: Vec<String>,
}

impl TreeActionResponse {
    fn success(report: SyncReport) -> Self {
        let message = match &report.mirror {
            MirrorOutcome::Failed(warning) => format!("ok; mirror warning: {warning}"),
            MirrorOutcome::Status(_) => "ok".to_string(),
        };
        Self {
            ok: true,
            node_id: Some(report.node_id.to_string()),
            mirror: Some(report.mirror.label().to_string()),
            message,
            removed_ids: report.removed.iter().map(ToString::to_string).collect(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            node_id: None,
            mirror: None,
            message: message.into(),
            removed_ids: Vec::new(),
        }
    }
}

/// Content read response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContentResponse {
    pub ok: bool,
    /// Stored content; `None` when nothing is stored yet.
    pub content: Option<String>,
    pub message: String,
}

/// Creates a folder under `parent_id`.
#[flutter_rust_bridge::frb(sync)]
pub fn tree_create_folder(parent_id: Option<String>, name: String) -> TreeActionResponse {
    respond("tree_create_folder", |coordinator| {
        let parent_id = parse_parent_id(parent_id.as_deref())?;
        Ok(coordinator.create_folder(&parent_id, &name)?)
    })
}

/// Creates a note or board with empty content.
///
/// Input semantics:
/// - `file_type`: `note` or `board`.
/// - `node_id`: optional caller-generated `file_*` id.
#[flutter_rust_bridge::frb(sync)]
pub fn tree_create_file(
    parent_id: Option<String>,
    file_type: String,
    name: String,
    node_id: Option<String>,
) -> TreeActionResponse {
    respond("tree_create_file", |coordinator| {
        let parent_id = parse_parent_id(parent_id.as_deref())?;
        let file_type = FileType::parse(file_type.trim())
            .ok_or_else(|| format!("unsupported file type `{file_type}`; expected note|board"))?;
        let report = match node_id.as_deref() {
            Some(raw) => {
                coordinator.create_file_with_id(parse_node_id(raw)?, &parent_id, file_type, &name)?
            }
            None => coordinator.create_file(&parent_id, file_type, &name)?,
        };
        Ok(report)
    })
}

/// Renames one node and its mirror copy.
#[flutter_rust_bridge::frb(sync)]
pub fn tree_rename(node_id: String, new_name: String) -> TreeActionResponse {
    respond("tree_rename", |coordinator| {
        let node_id = parse_node_id(&node_id)?;
        Ok(coordinator.rename(&node_id, &new_name)?)
    })
}

/// Replaces the full children order of one folder.
#[flutter_rust_bridge::frb(sync)]
pub fn tree_reorder(parent_id: Option<String>, ordered_ids: Vec<String>) -> TreeActionResponse {
    respond("tree_reorder", |coordinator| {
        let parent_id = parse_parent_id(parent_id.as_deref())?;
        let ordered_ids = ordered_ids
            .iter()
            .map(|raw| parse_node_id(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(coordinator.reorder(&parent_id, ordered_ids)?)
    })
}

/// Moves one node under `new_parent_id` at `index` (append when `None`).
#[flutter_rust_bridge::frb(sync)]
pub fn tree_move(
    node_id: String,
    new_parent_id: Option<String>,
    index: Option<u32>,
) -> TreeActionResponse {
    respond("tree_move", |coordinator| {
        let node_id = parse_node_id(&node_id)?;
        let new_parent_id = parse_parent_id(new_parent_id.as_deref())?;
        Ok(coordinator.move_node(&node_id, &new_parent_id, index.map(|value| value as usize))?)
    })
}

/// Deletes one node. Non-empty folders require `cascade`.
#[flutter_rust_bridge::frb(sync)]
pub fn tree_delete(node_id: String, cascade: bool) -> TreeActionResponse {
    respond("tree_delete", |coordinator| {
        let node_id = parse_node_id(&node_id)?;
        let mode = if cascade {
            FolderDeleteMode::Cascade
        } else {
            FolderDeleteMode::RejectNonEmpty
        };
        Ok(coordinator.delete(&node_id, mode)?)
    })
}

/// Writes content immediately and refreshes an existing mirror file.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_update(node_id: String, content: String) -> TreeActionResponse {
    respond("file_content_update", |coordinator| {
        let node_id = parse_node_id(&node_id)?;
        Ok(coordinator.update_content(&node_id, &content)?)
    })
}

/// Records an editor change; it is written by `file_content_flush`.
///
/// Only existing note and board ids are accepted.
/// Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_schedule(node_id: String, content: String) -> String {
    let result = with_coordinator(|coordinator| {
        let node_id = parse_file_id(&node_id)?;
        coordinator.schedule_content_change(&node_id, content, Instant::now())?;
        Ok(())
    });
    match result {
        Ok(()) => String::new(),
        Err(err) => format!("file_content_schedule failed: {err}"),
    }
}

/// Drops the pending change of one file (editor unmount).
///
/// Falls back to the pending queue alone when the database cannot be
/// opened, so an unmount never leaves a stale write behind.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_cancel(node_id: String) -> bool {
    let Ok(node_id) = parse_file_id(&node_id) else {
        return false;
    };
    match with_coordinator(|coordinator| Ok(coordinator.cancel_content_change(&node_id))) {
        Ok(cancelled) => cancelled,
        Err(err) => {
            warn!("event=content_debounce module=ffi status=degraded op=cancel error={err}");
            lock_workspace()
                .as_mut()
                .is_some_and(|pending| pending.cancel(&node_id))
        }
    }
}

/// Writes scheduled changes whose debounce window has elapsed.
///
/// `force` writes every pending change regardless of deadline. A change
/// that could not be stored stays pending for the next flush.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_flush(force: bool) -> Vec<TreeActionResponse> {
    let result = with_coordinator(|coordinator| {
        let flushed = if force {
            coordinator.flush_all_content()
        } else {
            coordinator.flush_due_content(Instant::now())
        };
        Ok(flushed
            .into_iter()
            .map(|result| match result {
                Ok(report) => TreeActionResponse::success(report),
                Err(err) => {
                    TreeActionResponse::failure(format!("file_content_flush failed: {err}"))
                }
            })
            .collect::<Vec<_>>())
    });
    match result {
        Ok(responses) => responses,
        Err(err) => vec![TreeActionResponse::failure(format!(
            "file_content_flush failed: {err}"
        ))],
    }
}

/// Number of editor changes waiting for a flush.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_pending_count() -> u32 {
    lock_workspace()
        .as_ref()
        .map_or(0, |pending| pending.pending_len() as u32)
}

/// Milliseconds until the earliest pending change is due; `None` when
/// nothing is pending. Lets the UI arm one flush timer.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_next_flush_ms() -> Option<u64> {
    let deadline = lock_workspace().as_ref()?.next_deadline()?;
    let remaining = deadline.saturating_duration_since(Instant::now());
    Some(remaining.as_millis() as u64)
}

/// Reads stored content of one file.
#[flutter_rust_bridge::frb(sync)]
pub fn file_content_get(node_id: String) -> FileContentResponse {
    let result = with_coordinator(|coordinator| {
        let node_id = parse_node_id(&node_id)?;
        Ok(coordinator.read_content(&node_id)?)
    });
    match result {
        Ok(content) => FileContentResponse {
            ok: true,
            content,
            message: "ok".to_string(),
        },
        Err(err) => FileContentResponse {
            ok: false,
            content: None,
            message: format!("file_content_get failed: {err}"),
        },
    }
}

/// Rewrites every mirror directory and file from the authoritative stores.
#[flutter_rust_bridge::frb(sync)]
pub fn mirror_rebuild() -> Vec<TreeActionResponse> {
    match with_coordinator(|coordinator| {
        Ok(coordinator
            .mirror_all()
            .into_iter()
            .map(TreeActionResponse::success)
            .collect::<Vec<_>>())
    }) {
        Ok(responses) => responses,
        Err(err) => vec![TreeActionResponse::failure(format!(
            "mirror_rebuild failed: {err}"
        ))],
    }
}

/// Returns the whole tree as JSON, depth-first.
///
/// Shape: `{"ok":true,"nodes":[{"id","name","kind","parent_id","depth","mirror_path"}]}`;
/// on failure `{"ok":false,"message":"..."}`.
#[flutter_rust_bridge::frb(sync)]
pub fn tree_snapshot_json() -> String {
    let result = with_coordinator(|coordinator| {
        let tree = coordinator.tree();
        let nodes = tree
            .depth_first()
            .into_iter()
            .map(|(depth, node)| {
                let mirror_path = coordinator
                    .mirror()
                    .resolve(tree, &node.id)
                    .ok()
                    .flatten()
                    .map(|resolved| resolved.full_path.display().to_string());
                serde_json::json!({
                    "id": node.id.as_str(),
                    "name": node.name,
                    "kind": node.kind_label(),
                    "parent_id": node.parent_id.as_ref().map(NodeId::as_str),
                    "depth": depth,
                    "mirror_path": mirror_path,
                })
            })
            .collect::<Vec<_>>();
        Ok(serde_json::json!({ "ok": true, "nodes": nodes }))
    });
    match result {
        Ok(value) => value.to_string(),
        Err(err) => serde_json::json!({
            "ok": false,
            "message": format!("tree_snapshot_json failed: {err}"),
        })
        .to_string(),
    }
}

/// Internal error carrier: parse failures and core errors as text.
struct FfiError(String);

impl std::fmt::Display for FfiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for FfiError {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<revezone_core::SyncError> for FfiError {
    fn from(value: revezone_core::SyncError) -> Self {
        Self(value.to_string())
    }
}

fn respond(
    operation: &'static str,
    f: impl FnOnce(&mut FfiCoordinator<'_>) -> Result<SyncReport, FfiError>,
) -> TreeActionResponse {
    match with_coordinator(f) {
        Ok(report) => TreeActionResponse::success(report),
        Err(err) => TreeActionResponse::failure(format!("{operation} failed: {err}")),
    }
}

fn with_coordinator<T>(
    f: impl FnOnce(&mut FfiCoordinator<'_>) -> Result<T, FfiError>,
) -> Result<T, FfiError> {
    let mut workspace = lock_workspace();
    with_workspace(ffi_config(), &mut workspace, f)
}

/// Runs one intent against the workspace described by `config`, lending it
/// the pending content held in `workspace`.
fn with_workspace<T>(
    config: &CoreConfig,
    workspace: &mut Option<ContentDebouncer>,
    f: impl FnOnce(&mut FfiCoordinator<'_>) -> Result<T, FfiError>,
) -> Result<T, FfiError> {
    let conn = open_db(config.resolved_db_path())
        .map_err(|err| format!("workspace DB open failed: {err}"))?;
    let repo = SqliteTreeRepository::try_new(&conn)
        .map_err(|err| format!("tree repo init failed: {err}"))?;
    let tree = TreeStore::load(repo).map_err(|err| format!("tree load failed: {err}"))?;
    let contents = ContentStores::new(
        SqliteContentStore::boards(&conn)
            .map_err(|err| format!("board store init failed: {err}"))?,
        SqliteContentStore::notes(&conn)
            .map_err(|err| format!("note store init failed: {err}"))?,
    );
    let mirror = MirrorWriter::new(NativeFs, config.storage_root.clone());

    // Pending content only leaves the lock once the coordinator exists.
    let pending = workspace
        .take()
        .unwrap_or_else(|| ContentDebouncer::new(config.content_debounce()));
    let mut coordinator = SyncCoordinator::new(tree, contents, mirror).with_debouncer(pending);
    let result = f(&mut coordinator);
    *workspace = Some(coordinator.into_debouncer());
    result
}

fn lock_workspace() -> MutexGuard<'static, Option<ContentDebouncer>> {
    // A panic inside a previous call leaves at worst a missing debouncer,
    // which the next call recreates.
    WORKSPACE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn ffi_config() -> &'static CoreConfig {
    FFI_CONFIG.get_or_init(|| {
        let config = CoreConfig::from_env().and_then(|config| {
            config.validate()?;
            Ok(config)
        });
        let config = match config {
            Ok(config) => config,
            Err(err) => {
                warn!("event=config_load module=ffi status=error error={err}");
                CoreConfig::default()
            }
        };
        match init_logging_from_config(&config) {
            Ok(true) => info!(
                "event=config_load module=ffi status=ok storage_root={}",
                config
                    .storage_root
                    .as_deref()
                    .map_or_else(|| "-".to_string(), |root| root.display().to_string())
            ),
            Ok(false) => {}
            Err(err) => warn!("event=logging_init module=ffi status=error error={err}"),
        }
        config
    })
}

fn parse_node_id(raw: &str) -> Result<NodeId, String> {
    NodeId::parse(raw.trim()).ok_or_else(|| format!("invalid node id `{raw}`"))
}

fn parse_file_id(raw: &str) -> Result<NodeId, String> {
    let node_id = parse_node_id(raw)?;
    if node_id.is_file_id() {
        Ok(node_id)
    } else {
        Err(format!("node id `{raw}` is not a file id"))
    }
}

fn parse_parent_id(raw: Option<&str>) -> Result<NodeId, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(NodeId::root()),
        Some(value) => parse_node_id(value),
    }
}
