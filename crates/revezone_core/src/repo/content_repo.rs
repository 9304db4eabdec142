//! Note/board content store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the authoritative content of file nodes, one store per kind.
//! - Reject board payloads that are not JSON before they reach storage.
//!
//! # Invariants
//! - A store only sees rows of its own `FileType`.
//! - Content is stored verbatim; the mirror writes exactly these bytes.

use crate::db::migrations::latest_version;
use crate::db::{schema_version, table_exists, table_has_column, DbError};
use crate::model::node::{FileType, NodeId};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ContentResult<T> = Result<T, ContentError>;

/// Errors from content store operations.
#[derive(Debug)]
pub enum ContentError {
    Db(DbError),
    /// Content ids must be file ids.
    NotAFileId(NodeId),
    /// Board payload failed to parse as JSON.
    InvalidBoardJson(String),
    /// Row exists but belongs to another content kind.
    KindMismatch {
        file_id: NodeId,
        expected: FileType,
        actual: String,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for ContentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotAFileId(id) => write!(f, "content id is not a file id: {id}"),
            Self::InvalidBoardJson(message) => write!(f, "board content is not valid JSON: {message}"),
            Self::KindMismatch {
                file_id,
                expected,
                actual,
            } => write!(
                f,
                "content {file_id} is stored as `{actual}`, expected `{}`",
                expected.as_str()
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "content store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "content store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "content store requires column `{column}` in table `{table}`"
            ),
        }
    }
}

impl Error for ContentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ContentError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ContentError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Per-kind content persistence used by the sync coordinator.
pub trait ContentStore {
    /// Content kind served by this store.
    fn file_type(&self) -> FileType;
    /// Loads content, `None` when nothing is stored for `file_id`.
    fn get(&self, file_id: &NodeId) -> ContentResult<Option<String>>;
    /// Inserts or replaces content.
    fn add_or_update(&self, file_id: &NodeId, content: &str) -> ContentResult<()>;
    /// Deletes content; returns whether a row existed.
    fn delete(&self, file_id: &NodeId) -> ContentResult<bool>;
}

/// SQLite-backed content store scoped to one `FileType`.
pub struct SqliteContentStore<'conn> {
    conn: &'conn Connection,
    file_type: FileType,
}

impl<'conn> SqliteContentStore<'conn> {
    pub fn try_new(conn: &'conn Connection, file_type: FileType) -> ContentResult<Self> {
        ensure_content_connection_ready(conn)?;
        Ok(Self { conn, file_type })
    }

    /// Markdown note store.
    pub fn notes(conn: &'conn Connection) -> ContentResult<Self> {
        Self::try_new(conn, FileType::Note)
    }

    /// Excalidraw board store.
    pub fn boards(conn: &'conn Connection) -> ContentResult<Self> {
        Self::try_new(conn, FileType::Board)
    }

    fn stored_type(&self, file_id: &NodeId) -> ContentResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT file_type FROM file_contents WHERE file_id = ?1;",
                [file_id.as_str()],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn ensure_kind(&self, file_id: &NodeId) -> ContentResult<()> {
        if !file_id.is_file_id() {
            return Err(ContentError::NotAFileId(file_id.clone()));
        }
        match self.stored_type(file_id)? {
            Some(actual) if actual != self.file_type.as_str() => Err(ContentError::KindMismatch {
                file_id: file_id.clone(),
                expected: self.file_type,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

impl ContentStore for SqliteContentStore<'_> {
    fn file_type(&self) -> FileType {
        self.file_type
    }

    fn get(&self, file_id: &NodeId) -> ContentResult<Option<String>> {
        let content = self
            .conn
            .query_row(
                "SELECT content
                 FROM file_contents
                 WHERE file_id = ?1
                   AND file_type = ?2;",
                params![file_id.as_str(), self.file_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    fn add_or_update(&self, file_id: &NodeId, content: &str) -> ContentResult<()> {
        self.ensure_kind(file_id)?;
        if self.file_type == FileType::Board {
            serde_json::from_str::<serde_json::Value>(content)
                .map_err(|err| ContentError::InvalidBoardJson(err.to_string()))?;
        }

        self.conn.execute(
            "INSERT INTO file_contents (file_id, file_type, content)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(file_id) DO UPDATE SET
                content = excluded.content,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![file_id.as_str(), self.file_type.as_str(), content],
        )?;
        debug!(
            "event=content_write module=repo status=ok file_id={} file_type={} bytes={}",
            file_id,
            self.file_type.as_str(),
            content.len()
        );
        Ok(())
    }

    fn delete(&self, file_id: &NodeId) -> ContentResult<bool> {
        self.ensure_kind(file_id)?;
        let changed = self.conn.execute(
            "DELETE FROM file_contents
             WHERE file_id = ?1
               AND file_type = ?2;",
            params![file_id.as_str(), self.file_type.as_str()],
        )?;
        Ok(changed > 0)
    }
}

fn ensure_content_connection_ready(conn: &Connection) -> ContentResult<()> {
    let expected_version = latest_version();
    let actual_version = schema_version(conn)?;
    if actual_version != expected_version {
        return Err(ContentError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "file_contents")? {
        return Err(ContentError::MissingRequiredTable("file_contents"));
    }
    for column in ["file_id", "file_type", "content", "updated_at"] {
        if !table_has_column(conn, "file_contents", column)? {
            return Err(ContentError::MissingRequiredColumn {
                table: "file_contents",
                column,
            });
        }
    }
    Ok(())
}
