//! SQLite-backed save document and side-state store.

use crate::error::{StorageError, StorageResult};
use crate::{MetaStore, StateStore};
use rusqlite::{params, Connection, OptionalExtension};
use savesync_types::{PersistedState, Timestamp};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Save format version written by this build.
pub const CURRENT_SAVE_VERSION: i64 = 1;

/// Single-slot document store plus a key/value table, in one SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened save store at {}", path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS save_document (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                save_version INTEGER NOT NULL,
                body TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Lock)
    }

    /// Stored save format version, if a document exists.
    pub fn save_version(&self) -> StorageResult<Option<i64>> {
        let conn = self.lock()?;
        let version = conn
            .query_row(
                "SELECT save_version FROM save_document WHERE slot = 0",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Writes a raw body with an explicit version. Used to stage legacy rows.
    pub fn save_raw(&self, body: &str, save_version: i64) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO save_document (slot, save_version, body, saved_at) VALUES (0, ?1, ?2, ?3)
             ON CONFLICT(slot) DO UPDATE SET save_version = ?1, body = ?2, saved_at = ?3",
            params![save_version, body, Timestamp::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

/// Upgrades a stored body to [`CURRENT_SAVE_VERSION`].
///
/// Version 0 bodies predate the version column and carry a stale
/// `saveVersion` field of their own; it is dropped.
fn migrate(mut body: Value, from_version: i64) -> StorageResult<Value> {
    if from_version > CURRENT_SAVE_VERSION {
        return Err(StorageError::InvalidData(format!(
            "save version {from_version} is newer than supported {CURRENT_SAVE_VERSION}"
        )));
    }
    let object = body
        .as_object_mut()
        .ok_or_else(|| StorageError::InvalidData("save body is not an object".to_string()))?;
    if from_version < 1 {
        info!("Migrating local save from version {from_version} to {CURRENT_SAVE_VERSION}");
        object.remove("saveVersion");
    }
    Ok(body)
}

impl StateStore for SqliteStore {
    fn load(&self) -> StorageResult<Option<PersistedState>> {
        let row: Option<(i64, String)> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT save_version, body FROM save_document WHERE slot = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        let Some((version, body)) = row else {
            return Ok(None);
        };

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            warn!("Local save is not valid JSON: {e}");
            StorageError::InvalidData(format!("local save is not valid JSON: {e}"))
        })?;
        let migrated = migrate(value, version)?;
        let state = serde_json::from_value(migrated)?;
        Ok(Some(state))
    }

    fn save(&self, state: &PersistedState) -> StorageResult<()> {
        let body = serde_json::to_string(state)?;
        self.save_raw(&body, CURRENT_SAVE_VERSION)?;
        debug!("Saved local document (level {})", state.character.level);
        Ok(())
    }

    fn reset(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM save_document", [])?;
        info!("Local save reset");
        Ok(())
    }
}

impl MetaStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM sync_meta WHERE key = ?1", params![key])?;
        Ok(())
    }
}
