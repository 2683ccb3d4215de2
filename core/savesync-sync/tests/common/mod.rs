//! Shared test helpers for sync tests.

#![allow(dead_code)]

use async_trait::async_trait;
use savesync_storage::SqliteStore;
use savesync_sync::{
    AccessToken, CredentialProvider, DocumentBackend, Identity, RemoteDocumentStore, SyncConfig,
    SyncEngine, SyncError, SyncResult, UpdateOutcome,
};
use savesync_types::{CycleRecord, PersistedState, Timestamp};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Routes engine logs to the test output. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixed reference instant for building document histories.
pub fn base_time() -> Timestamp {
    Timestamp::parse("2024-03-01T10:00:00.000Z").unwrap()
}

/// `base_time()` shifted by `secs` (may be negative).
pub fn at(secs: i64) -> Timestamp {
    Timestamp::from_millis(base_time().as_millis() + secs * 1000).unwrap()
}

/// A document with one finished cycle ending `end_secs` after `base_time()`.
pub fn state_at(level: u32, xp: f64, end_secs: i64) -> PersistedState {
    let mut state = PersistedState::new(level, xp);
    state
        .analytics
        .cycles
        .push(CycleRecord::new(at(end_secs - 1500), Some(at(end_secs))));
    state
}

pub fn test_identity() -> Identity {
    Identity {
        id: 42,
        login: "octocat".to_string(),
        name: Some("The Octocat".to_string()),
        avatar_url: None,
    }
}

/// An in-memory credential provider, already signed in.
pub fn signed_in() -> Arc<CredentialProvider> {
    let credentials = CredentialProvider::new();
    credentials
        .sign_in(test_identity(), AccessToken::new("test-token"))
        .unwrap();
    Arc::new(credentials)
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        device_name: "test device".to_string(),
        network_timeout_ms: 5_000,
        ..Default::default()
    }
}

/// Everything an engine test needs to poke at.
pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub store: Arc<SqliteStore>,
    pub remote: Arc<MockRemote>,
    pub credentials: Arc<CredentialProvider>,
}

pub fn harness() -> Harness {
    harness_with(test_config(), signed_in())
}

pub fn harness_with(config: SyncConfig, credentials: Arc<CredentialProvider>) -> Harness {
    init_tracing();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let remote = Arc::new(MockRemote::default());
    let engine = Arc::new(SyncEngine::new(
        config,
        store.clone(),
        store.clone(),
        remote.clone(),
        credentials.clone(),
    ));
    Harness {
        engine,
        store,
        remote,
        credentials,
    }
}

// ── MockRemote ───────────────────────────────────────────────────

/// A scriptable [`RemoteDocumentStore`].
#[derive(Default)]
pub struct MockRemote {
    doc: Mutex<Option<PersistedState>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    delay: Mutex<Option<Duration>>,
    gated: AtomicBool,
    /// Signalled when a gated load starts.
    pub entered: Notify,
    /// Releases a gated load.
    pub release: Notify,
    pub loads: AtomicUsize,
    pub saves: AtomicUsize,
}

impl MockRemote {
    pub fn set_doc(&self, doc: Option<PersistedState>) {
        *self.doc.lock().unwrap() = doc;
    }

    pub fn doc(&self) -> Option<PersistedState> {
        self.doc.lock().unwrap().clone()
    }

    pub fn fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Makes every call sleep for `delay` first.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Makes the next loads wait for `release`.
    pub fn gate(&self, gated: bool) {
        self.gated.store(gated, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteDocumentStore for MockRemote {
    async fn save(&self, state: &PersistedState) -> SyncResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection reset".to_string()));
        }
        self.set_doc(Some(state.clone()));
        Ok(())
    }

    async fn load(&self) -> SyncResult<Option<PersistedState>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.gated.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.pause().await;
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SyncError::Network("connection refused".to_string()));
        }
        Ok(self.doc())
    }
}

// ── MemoryBackend ────────────────────────────────────────────────

/// An in-memory [`DocumentBackend`]. Every stored document carries the label.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<BTreeMap<String, String>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub fetches: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl MemoryBackend {
    pub fn insert(&self, id: &str, content: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
    }

    pub fn remove(&self, id: &str) {
        self.docs.lock().unwrap().remove(id);
    }

    pub fn content(&self, id: &str) -> Option<String> {
        self.docs.lock().unwrap().get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.docs.lock().unwrap().keys().cloned().collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, content: &str) -> SyncResult<String> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.insert(&id, content);
        Ok(id)
    }

    async fn update(&self, id: &str, content: &str) -> SyncResult<UpdateOutcome> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut docs = self.docs.lock().unwrap();
        match docs.get_mut(id) {
            Some(existing) => {
                *existing = content.to_string();
                Ok(UpdateOutcome::Updated)
            }
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn fetch(&self, id: &str) -> SyncResult<Option<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.content(id))
    }

    async fn find_by_label(&self) -> SyncResult<Option<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.docs.lock().unwrap().keys().next().cloned())
    }
}
