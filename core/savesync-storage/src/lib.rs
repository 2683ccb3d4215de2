//! Local persistence for savesync.
//!
//! Two concerns live here:
//! - [`StateStore`]: the durable local copy of the save document
//! - [`MetaStore`]: small key/value side-state that must survive restarts
//!   (last successful sync, cached remote document id, stored credential)
//!
//! [`SqliteStore`] implements both on a single SQLite file.

mod error;
mod sqlite_store;

pub use error::{StorageError, StorageResult};
pub use sqlite_store::{SqliteStore, CURRENT_SAVE_VERSION};

use savesync_types::PersistedState;

/// Well-known [`MetaStore`] keys.
pub mod keys {
    /// RFC 3339 time of the last successful sync.
    pub const LAST_SYNC_AT: &str = "last_sync_at";
    /// Id of the remote save document, once discovered.
    pub const REMOTE_DOCUMENT_ID: &str = "remote_document_id";
    /// Serialized credential of the signed-in user.
    pub const CREDENTIAL: &str = "credential";
}

/// Durable storage for the local save document.
pub trait StateStore: Send + Sync {
    /// Loads the stored document, or `None` if nothing was saved yet.
    fn load(&self) -> StorageResult<Option<PersistedState>>;

    /// Replaces the stored document.
    fn save(&self, state: &PersistedState) -> StorageResult<()>;

    /// Deletes the stored document.
    fn reset(&self) -> StorageResult<()>;
}

/// String key/value storage for sync side-state.
pub trait MetaStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}
