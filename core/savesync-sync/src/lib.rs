//! Cloud save synchronization for savesync.
//!
//! Keeps a local save document and one remote copy consistent across devices.
//!
//! # Components
//!
//! - **Engine**: the status state machine and every sync command
//! - **Status**: snapshots and the observer publisher
//! - **Conflict**: the divergence predicate that decides between merging and
//!   asking the user
//! - **Merge**: latest-wins with analytics union, and field-wise maximum
//! - **Remote**: the document store contract, its labeled-document adapter and
//!   the GitHub Gist backend
//! - **Auth**: the credential the engine reads
//! - **Scheduler**: interval auto-sync bound to the signed-in lifetime
//!
//! # Sync Process
//!
//! 1. Load the local document (argument or [`StateStore`](savesync_storage::StateStore))
//! 2. Fetch the remote document; upload the local one if there is none
//! 3. Saves that diverge and were produced far apart enter the conflict phase
//! 4. Anything else is merged and written locally, then remotely
//!
//! # Example
//!
//! ```no_run
//! use savesync_storage::SqliteStore;
//! use savesync_sync::{
//!     CredentialProvider, GistBackend, GistConfig, LabeledDocumentStore, SyncConfig, SyncEngine,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("save.db")?);
//! let credentials = Arc::new(CredentialProvider::restore(store.clone()));
//! let config = SyncConfig::default();
//!
//! let backend = GistBackend::new(GistConfig::default(), credentials.clone())?;
//! let remote = Arc::new(LabeledDocumentStore::new(
//!     backend,
//!     store.clone(),
//!     &config.device_name,
//! ));
//!
//! let engine = SyncEngine::new(config, store.clone(), store, remote, credentials);
//! let outcome = engine.sync_now(None).await;
//! println!("synced: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod conflict;
mod engine;
pub mod envelope;
mod error;
pub mod merge;
pub mod remote;
pub mod scheduler;
pub mod status;

pub use auth::{AccessToken, Credential, CredentialProvider, Identity};
pub use conflict::{detect_conflict, ConflictThresholds};
pub use engine::{ResolutionStrategy, SyncConfig, SyncEngine, SyncOutcome};
pub use envelope::{SaveEnvelope, SaveMetadata};
pub use error::{SyncError, SyncResult};
pub use merge::{merge_analytics, merge_latest, merge_progressive};
pub use remote::{
    DocumentBackend, GistBackend, GistConfig, LabeledDocumentStore, RemoteDocumentStore,
    Revision, UpdateOutcome,
};
pub use scheduler::AutoSync;
pub use status::{ConflictSnapshot, StatusPublisher, Subscription, SyncPhase, SyncStatus};
