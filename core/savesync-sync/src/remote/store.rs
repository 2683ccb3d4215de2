//! Remote storage traits.

use crate::error::SyncResult;
use async_trait::async_trait;
use savesync_types::{PersistedState, Timestamp};
use serde::{Deserialize, Serialize};

/// The engine's view of remote storage: one opaque document.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    /// Creates or replaces the remote document.
    async fn save(&self, state: &PersistedState) -> SyncResult<()>;

    /// Loads the remote document. `Ok(None)` means none exists yet.
    async fn load(&self) -> SyncResult<Option<PersistedState>>;
}

/// Result of updating a document by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
}

/// One stored revision of the remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub version: String,
    pub committed_at: Timestamp,
}

/// Transport-level contract for a store of labeled text documents.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Returns the name of the provider.
    fn provider_name(&self) -> &'static str;

    /// Creates a new labeled document and returns its id.
    async fn create(&self, content: &str) -> SyncResult<String>;

    /// Replaces the content of an existing document.
    async fn update(&self, id: &str, content: &str) -> SyncResult<UpdateOutcome>;

    /// Reads a document. `Ok(None)` means the id no longer exists.
    async fn fetch(&self, id: &str) -> SyncResult<Option<String>>;

    /// Finds the id of the document carrying this backend's label.
    async fn find_by_label(&self) -> SyncResult<Option<String>>;

    /// Lists recent revisions of a document, newest first.
    async fn revisions(&self, _id: &str) -> SyncResult<Vec<Revision>> {
        Ok(Vec::new())
    }

    /// A human-facing link to the document, if the provider has one.
    fn document_url(&self, _id: &str) -> Option<String> {
        None
    }
}
