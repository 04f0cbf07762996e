//! Embedded SQLite storage layer (C1). A single connection, guarded by a
//! `tokio::sync::Mutex`, is shared by every other module in this crate —
//! there is no connection pool, and every operator goes through the
//! statements defined alongside the module that owns the table.

mod schema;

use std::path::Path;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use crate::types::error::StorageError;
use crate::types::ids::SessionId;

/// SQLite-backed storage shared by every operator in this crate.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) the database at `path`, applying WAL mode and the
    /// schema migration.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::MigrationFailed {
                    from: 0,
                    to: schema::CURRENT_SCHEMA_VERSION,
                    reason: format!("create dir: {e}"),
                })?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database. Used by tests and by callers that don't
    /// want durability.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn migrate(conn: &Connection) -> Result<(), StorageError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < 1 {
            conn.execute_batch(schema::SCHEMA_V1)?;
            conn.pragma_update(None, "user_version", schema::CURRENT_SCHEMA_VERSION)?;
        }
        Ok(())
    }

    /// Acquire the connection lock. Every other module reaches the database
    /// through this — there is no separate pool.
    pub(crate) async fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    /// Cascade-delete every record for `session_id`. No foreign keys are
    /// declared, so ordering here is load-bearing: children before parents.
    pub async fn delete_session_cascade(&self, session_id: SessionId) -> Result<(), StorageError> {
        let mut conn = self.conn().await;
        let tx = conn.transaction()?;
        let sid = session_id.to_string();
        for table in [
            "fact_conflicts",
            "facts",
            "entities",
            "relationships",
            "got_operations",
            "got_paths",
            "agents",
            "activity_log",
            "ingest_queue",
            "checkpoints",
            "session_metrics",
            "citations",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE session_id = ?1"),
                rusqlite::params![sid],
            )?;
        }
        tx.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            rusqlite::params![sid],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove rows in session-scoped tables whose `session_id` no longer
    /// has a matching `sessions` row. Defensive cleanup for partial
    /// failures during [`Storage::delete_session_cascade`] or process
    /// crashes between individual deletes.
    pub async fn cleanup_orphan_records(&self) -> Result<u64, StorageError> {
        let conn = self.conn().await;
        let mut total = 0u64;
        for table in [
            "fact_conflicts",
            "facts",
            "entities",
            "relationships",
            "got_operations",
            "got_paths",
            "agents",
            "activity_log",
            "ingest_queue",
            "checkpoints",
            "session_metrics",
            "citations",
        ] {
            let sql = format!(
                "DELETE FROM {table} WHERE session_id IS NOT NULL \
                 AND session_id NOT IN (SELECT session_id FROM sessions)"
            );
            total += conn.execute(&sql, [])? as u64;
        }
        Ok(total)
    }
}

/// Adapts `rusqlite::Error::QueryReturnedNoRows` into `Option::None`,
/// matching the idiom the rest of the crate's row lookups use.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn json_to_text<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn text_to_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, StorageError> {
    serde_json::from_str(text).map_err(|e| StorageError::Serialization(e.to_string()))
}
