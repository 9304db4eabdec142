//! Workspace tree repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the whole folder/file hierarchy as one row per non-root node.
//! - Rebuild a validated `FileTree` from persisted rows.
//!
//! # Invariants
//! - Child order is persisted as `sort_order` and read back with
//!   `sort_order ASC, node_id ASC`.
//! - `save_tree` is atomic: either every row matches the given tree or
//!   nothing changes.
//! - Rows that do not form a single-rooted tree are rejected as invalid data.

use crate::db::migrations::latest_version;
use crate::db::{schema_version, table_exists, table_has_column, DbError};
use crate::model::node::{FileType, NodeId, TreeNode};
use crate::model::tree::{FileTree, TreeError};
use log::{debug, info};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TreeRepoResult<T> = Result<T, TreeRepoError>;

/// Errors from workspace tree repository operations.
#[derive(Debug)]
pub enum TreeRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted rows cannot be converted into a valid tree.
    InvalidData(String),
}

impl Display for TreeRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "tree repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "tree repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "tree repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid tree data: {message}"),
        }
    }
}

impl Error for TreeRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for TreeRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TreeRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for whole-tree persistence.
pub trait TreeRepository {
    /// Loads the persisted hierarchy; an empty table yields a root-only tree.
    fn load_tree(&self) -> TreeRepoResult<FileTree>;
    /// Replaces the persisted hierarchy with `tree`.
    fn save_tree(&self, tree: &FileTree) -> TreeRepoResult<()>;
}

/// SQLite-backed workspace tree repository.
pub struct SqliteTreeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTreeRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> TreeRepoResult<Self> {
        ensure_tree_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

struct NodeRow {
    node_id: NodeId,
    kind: String,
    parent_id: NodeId,
    name: String,
}

impl TreeRepository for SqliteTreeRepository<'_> {
    fn load_tree(&self) -> TreeRepoResult<FileTree> {
        let mut stmt = self.conn.prepare(
            "SELECT node_id, kind, parent_id, name
             FROM tree_nodes
             ORDER BY sort_order ASC, node_id ASC;",
        )?;
        let mut rows = stmt.query([])?;

        let mut by_parent: HashMap<NodeId, Vec<NodeRow>> = HashMap::new();
        let mut total = 0usize;
        while let Some(row) = rows.next()? {
            let node_id_text: String = row.get("node_id")?;
            let parent_id_text: String = row.get("parent_id")?;
            let parsed = NodeRow {
                node_id: parse_node_id(&node_id_text, "tree_nodes.node_id")?,
                kind: row.get("kind")?,
                parent_id: parse_node_id(&parent_id_text, "tree_nodes.parent_id")?,
                name: row.get("name")?,
            };
            by_parent
                .entry(parsed.parent_id.clone())
                .or_default()
                .push(parsed);
            total += 1;
        }

        let mut tree = FileTree::new();
        let mut queue = VecDeque::from([NodeId::root()]);
        while let Some(parent_id) = queue.pop_front() {
            for row in by_parent.remove(&parent_id).unwrap_or_default() {
                let node = node_from_row(&row)?;
                if node.is_folder() {
                    queue.push_back(row.node_id.clone());
                }
                tree.add_node(&row.parent_id, node)
                    .map_err(|err| invalid_tree_row(&row, err))?;
            }
        }

        if tree.len() != total {
            return Err(TreeRepoError::InvalidData(format!(
                "{} tree rows are not reachable from root",
                total - tree.len()
            )));
        }

        debug!("event=tree_load module=repo status=ok nodes={}", tree.len());
        Ok(tree)
    }

    fn save_tree(&self, tree: &FileTree) -> TreeRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let live_ids: HashSet<&str> = tree
            .iter()
            .filter(|node| !node.id.is_root())
            .map(|node| node.id.as_str())
            .collect();
        let stale_ids = list_persisted_ids(&tx)?
            .into_iter()
            .filter(|id| !live_ids.contains(id.as_str()))
            .collect::<Vec<_>>();
        for stale_id in &stale_ids {
            tx.execute("DELETE FROM tree_nodes WHERE node_id = ?1;", [stale_id])?;
        }

        // Park every row under a unique placeholder parent first so that a
        // name swap between siblings cannot trip the (parent_id, name) index.
        tx.execute(
            "UPDATE tree_nodes SET parent_id = '~' || node_id;",
            [],
        )?;

        for (_, node) in tree.depth_first() {
            let parent_id = node
                .parent_id
                .as_ref()
                .ok_or_else(|| TreeRepoError::InvalidData(format!("node {} has no parent", node.id)))?;
            let sort_order = tree
                .children(parent_id)
                .map_err(|err| TreeRepoError::InvalidData(err.to_string()))?
                .iter()
                .position(|child| child == &node.id)
                .ok_or_else(|| {
                    TreeRepoError::InvalidData(format!(
                        "node {} missing from parent {parent_id} children",
                        node.id
                    ))
                })?;

            tx.execute(
                "INSERT INTO tree_nodes (node_id, kind, parent_id, name, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(node_id) DO UPDATE SET
                    kind = excluded.kind,
                    parent_id = excluded.parent_id,
                    name = excluded.name,
                    sort_order = excluded.sort_order,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    node.id.as_str(),
                    node.kind_label(),
                    parent_id.as_str(),
                    node.name.as_str(),
                    sort_order as i64,
                ],
            )?;
        }

        tx.commit()?;
        info!(
            "event=tree_save module=repo status=ok nodes={} removed={}",
            tree.len(),
            stale_ids.len()
        );
        Ok(())
    }
}

fn list_persisted_ids(conn: &Connection) -> TreeRepoResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT node_id FROM tree_nodes;")?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get(0)?);
    }
    Ok(ids)
}

fn node_from_row(row: &NodeRow) -> TreeRepoResult<TreeNode> {
    if row.kind == "folder" {
        return Ok(TreeNode::folder_with_id(row.node_id.clone(), row.name.as_str()));
    }
    let file_type = FileType::parse(&row.kind).ok_or_else(|| {
        TreeRepoError::InvalidData(format!(
            "invalid node kind `{}` in tree_nodes.kind",
            row.kind
        ))
    })?;
    Ok(TreeNode::file_with_id(
        row.node_id.clone(),
        row.name.as_str(),
        file_type,
    ))
}

fn invalid_tree_row(row: &NodeRow, err: TreeError) -> TreeRepoError {
    TreeRepoError::InvalidData(format!(
        "row {} under {} rejected: {err}",
        row.node_id, row.parent_id
    ))
}

fn parse_node_id(value: &str, column: &'static str) -> TreeRepoResult<NodeId> {
    NodeId::parse(value)
        .ok_or_else(|| TreeRepoError::InvalidData(format!("invalid node id `{value}` in {column}")))
}

fn ensure_tree_connection_ready(conn: &Connection) -> TreeRepoResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(TreeRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "tree_nodes")? {
        return Err(TreeRepoError::MissingRequiredTable("tree_nodes"));
    }

    for column in [
        "node_id",
        "kind",
        "parent_id",
        "name",
        "sort_order",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "tree_nodes", column)? {
            return Err(TreeRepoError::MissingRequiredColumn {
                table: "tree_nodes",
                column,
            });
        }
    }

    Ok(())
}
