//! A [`RemoteDocumentStore`] over a labeled-document backend.
//!
//! The document id is discovered once by label and cached in memory and in
//! the [`MetaStore`], so later runs skip the lookup. A cached id the backend
//! no longer knows is dropped; the next save creates a fresh document.

use super::store::{DocumentBackend, RemoteDocumentStore, Revision, UpdateOutcome};
use crate::envelope::SaveEnvelope;
use crate::error::SyncResult;
use async_trait::async_trait;
use savesync_storage::{keys, MetaStore};
use savesync_types::PersistedState;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct LabeledDocumentStore<B> {
    backend: B,
    meta: Arc<dyn MetaStore>,
    document_id: RwLock<Option<String>>,
    device_name: String,
}

impl<B: DocumentBackend> LabeledDocumentStore<B> {
    /// Creates a store, picking up a document id cached by an earlier run.
    pub fn new(backend: B, meta: Arc<dyn MetaStore>, device_name: impl Into<String>) -> Self {
        let cached = match meta.get(keys::REMOTE_DOCUMENT_ID) {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to read cached remote document id: {e}");
                None
            }
        };
        if let Some(id) = &cached {
            debug!("Using cached {} document id {}", backend.provider_name(), id);
        }
        Self {
            backend,
            meta,
            document_id: RwLock::new(cached),
            device_name: device_name.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The cached document id, if one is known.
    pub async fn document_id(&self) -> Option<String> {
        self.document_id.read().await.clone()
    }

    /// Link to the remote document, if known and the provider has one.
    pub async fn document_url(&self) -> Option<String> {
        let id = self.document_id().await?;
        self.backend.document_url(&id)
    }

    /// Forgets the cached id. The remote document itself is left alone.
    pub async fn forget_document(&self) {
        self.set_document_id(None).await;
        info!("Forgot cached {} document id", self.backend.provider_name());
    }

    /// Recent revisions of the remote document.
    pub async fn history(&self) -> SyncResult<Vec<Revision>> {
        match self.resolve_id().await? {
            Some(id) => self.backend.revisions(&id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn set_document_id(&self, id: Option<String>) {
        let result = match &id {
            Some(id) => self.meta.set(keys::REMOTE_DOCUMENT_ID, id),
            None => self.meta.remove(keys::REMOTE_DOCUMENT_ID),
        };
        if let Err(e) = result {
            warn!("Failed to persist remote document id: {e}");
        }
        *self.document_id.write().await = id;
    }

    /// Cached id, else a label lookup whose hit is cached.
    async fn resolve_id(&self) -> SyncResult<Option<String>> {
        if let Some(id) = self.document_id().await {
            return Ok(Some(id));
        }
        self.lookup().await
    }

    async fn lookup(&self) -> SyncResult<Option<String>> {
        let found = self.backend.find_by_label().await?;
        match &found {
            Some(id) => {
                info!("Found {} save document {}", self.backend.provider_name(), id);
                self.set_document_id(Some(id.clone())).await;
            }
            None => debug!("No {} save document found", self.backend.provider_name()),
        }
        Ok(found)
    }

    async fn create(&self, content: &str) -> SyncResult<()> {
        let id = self.backend.create(content).await?;
        info!("Created {} save document {}", self.backend.provider_name(), id);
        self.set_document_id(Some(id)).await;
        Ok(())
    }

    async fn fetch_state(&self, id: &str) -> SyncResult<Option<PersistedState>> {
        match self.backend.fetch(id).await? {
            Some(content) => Ok(Some(SaveEnvelope::parse(&content)?.into_state())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<B: DocumentBackend> RemoteDocumentStore for LabeledDocumentStore<B> {
    async fn save(&self, state: &PersistedState) -> SyncResult<()> {
        let content = SaveEnvelope::wrap(state, &self.device_name).to_json()?;

        let Some(id) = self.resolve_id().await? else {
            return self.create(&content).await;
        };

        match self.backend.update(&id, &content).await? {
            UpdateOutcome::Updated => {
                debug!("Updated {} save document {}", self.backend.provider_name(), id);
                Ok(())
            }
            UpdateOutcome::NotFound => {
                warn!("Save document {} vanished, creating a new one", id);
                self.set_document_id(None).await;
                self.create(&content).await
            }
        }
    }

    async fn load(&self) -> SyncResult<Option<PersistedState>> {
        let Some(id) = self.resolve_id().await? else {
            return Ok(None);
        };

        if let Some(state) = self.fetch_state(&id).await? {
            return Ok(Some(state));
        }

        warn!("Cached save document {} not found, retrying label lookup", id);
        self.set_document_id(None).await;
        match self.lookup().await? {
            Some(found) if found != id => self.fetch_state(&found).await,
            Some(_) => {
                self.set_document_id(None).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
