//! Error types for the sync layer.

use savesync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No signed-in user. Expected; never recorded as `last_error`.
    #[error("not authenticated")]
    Unauthenticated,

    /// No connectivity. Expected; never recorded as `last_error`.
    #[error("device is offline")]
    Offline,

    /// The remote store holds no save document.
    #[error("no save found in remote storage")]
    RemoteNotFound,

    /// Transport failure reaching the remote store.
    #[error("network error: {0}")]
    Network(String),

    /// A network call exceeded its time budget.
    #[error("operation timed out")]
    Timeout,

    /// The remote document failed structural validation.
    #[error("malformed remote document: {0}")]
    MalformedDocument(String),

    /// Nothing to sync: no document was passed and none is stored.
    #[error("no local save found")]
    NoLocalDocument,

    /// Another sync attempt holds the engine.
    #[error("a sync is already in progress")]
    SyncInProgress,

    /// `resolve_conflict` was called outside the conflict phase.
    #[error("no conflict to resolve")]
    NoConflict,

    /// A detected conflict must be resolved before syncing again.
    #[error("a conflict is awaiting resolution")]
    ConflictPending,

    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote rejected our credential.
    #[error("authentication error: {0}")]
    Auth(String),
}

impl SyncError {
    /// Expected refusals that leave the engine's status untouched.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthenticated
                | SyncError::Offline
                | SyncError::NoLocalDocument
                | SyncError::SyncInProgress
                | SyncError::NoConflict
                | SyncError::ConflictPending
        )
    }

    /// Failures worth retrying on the next scheduled attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout | SyncError::MalformedDocument(_)
        )
    }
}

impl From<StorageError> for SyncError {
    fn from(e: StorageError) -> Self {
        SyncError::Storage(e.to_string())
    }
}
