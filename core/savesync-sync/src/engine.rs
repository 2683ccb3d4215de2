//! Sync engine: the status state machine and every sync command.
//!
//! At most one attempt runs at a time. Expected refusals (signed out,
//! offline, nothing to sync, busy) return immediately and leave the
//! published status untouched; everything else ends in a transition.

use crate::auth::CredentialProvider;
use crate::conflict::{detect_conflict, ConflictThresholds};
use crate::error::{SyncError, SyncResult};
use crate::merge::{merge_latest, merge_progressive};
use crate::remote::RemoteDocumentStore;
use crate::status::{ConflictSnapshot, StatusPublisher, Subscription, SyncPhase, SyncStatus};
use savesync_storage::{keys, MetaStore, StateStore};
use savesync_types::{PersistedState, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Device name written into each uploaded save.
    pub device_name: String,
    /// Period of the auto-sync timer (seconds).
    pub auto_sync_interval_secs: u64,
    /// Delay before the first attempt after sign-in (ms).
    pub initial_sync_delay_ms: u64,
    /// Budget for each remote call (ms).
    pub network_timeout_ms: u64,
    /// Whether connectivity is assumed at startup.
    pub initially_online: bool,
    pub conflict: ConflictThresholds,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_name: "savesync device".to_string(),
            auto_sync_interval_secs: 30,
            initial_sync_delay_ms: 1000,
            network_timeout_ms: 30_000,
            initially_online: true,
            conflict: ConflictThresholds::default(),
        }
    }
}

impl SyncConfig {
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.auto_sync_interval_secs)
    }

    pub fn initial_sync_delay(&self) -> Duration {
        Duration::from_millis(self.initial_sync_delay_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

/// How to settle a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Keep the remote save verbatim.
    PreferRemote,
    /// Keep the local save verbatim.
    PreferLocal,
    /// Field-wise maximum of both saves.
    MergeProgressive,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::PreferRemote => "prefer-remote",
            ResolutionStrategy::PreferLocal => "prefer-local",
            ResolutionStrategy::MergeProgressive => "merge-progressive",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer-remote" => Ok(ResolutionStrategy::PreferRemote),
            "prefer-local" => Ok(ResolutionStrategy::PreferLocal),
            "merge-progressive" => Ok(ResolutionStrategy::MergeProgressive),
            other => Err(format!("unknown resolution strategy: {other}")),
        }
    }
}

/// Result of a sync command.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Local and remote agree; the local document was not changed.
    Synced,
    /// Succeeded, and the stored local document now differs from the
    /// caller's copy. Dependent in-memory state should be reloaded.
    ReloadRequired,
    /// A conflict was detected and awaits [`SyncEngine::resolve_conflict`].
    Conflict,
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Synced | SyncOutcome::ReloadRequired)
    }

    pub fn has_conflict(&self) -> bool {
        matches!(self, SyncOutcome::Conflict)
    }

    pub fn requires_reload(&self) -> bool {
        matches!(self, SyncOutcome::ReloadRequired)
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            SyncOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncResult<SyncOutcome>> for SyncOutcome {
    fn from(result: SyncResult<SyncOutcome>) -> Self {
        result.unwrap_or_else(SyncOutcome::Failed)
    }
}

/// Releases the in-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The sync engine. One instance per application session, shared by `Arc`.
pub struct SyncEngine {
    config: SyncConfig,
    local: Arc<dyn StateStore>,
    meta: Arc<dyn MetaStore>,
    remote: Arc<dyn RemoteDocumentStore>,
    credentials: Arc<CredentialProvider>,
    status: StatusPublisher,
    online: AtomicBool,
    in_flight: AtomicBool,
    /// Single-slot queue of a document produced while offline.
    pending: Mutex<Option<PersistedState>>,
}

impl SyncEngine {
    /// Creates an engine. A missing or unreadable last-sync time is tolerated.
    pub fn new(
        config: SyncConfig,
        local: Arc<dyn StateStore>,
        meta: Arc<dyn MetaStore>,
        remote: Arc<dyn RemoteDocumentStore>,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        let last_sync_at = match meta.get(keys::LAST_SYNC_AT) {
            Ok(Some(raw)) => match Timestamp::parse(&raw) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    warn!("Ignoring stored last sync time: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read last sync time: {e}");
                None
            }
        };

        let phase = if config.initially_online {
            SyncPhase::Idle
        } else {
            SyncPhase::Offline
        };

        Self {
            online: AtomicBool::new(config.initially_online),
            config,
            local,
            meta,
            remote,
            credentials,
            status: StatusPublisher::new(SyncStatus::new(phase, last_sync_at)),
            in_flight: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    /// Returns a copy of the current status.
    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    /// Registers a status observer. It receives the current status at once,
    /// then every later change, until the returned handle is dropped.
    #[must_use = "dropping the subscription unsubscribes the observer"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        self.status.subscribe(observer)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Whether a sync attempt currently holds the engine.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_slot().is_some()
    }

    // ── Commands ────────────────────────────────────────────────

    /// Reconciles the local document with the remote one.
    ///
    /// Uses `doc` when given, else the stored local document.
    pub async fn sync_now(&self, doc: Option<PersistedState>) -> SyncOutcome {
        if let Err(e) = self.ensure_ready() {
            debug!("Sync refused: {e}");
            return SyncOutcome::Failed(e);
        }
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return SyncOutcome::Failed(e),
        };
        if self.status.snapshot().phase.is_conflict() {
            return SyncOutcome::Failed(SyncError::ConflictPending);
        }

        let local = match doc {
            Some(doc) => doc,
            None => match self.local.load() {
                Ok(Some(doc)) => doc,
                Ok(None) => return SyncOutcome::Failed(SyncError::NoLocalDocument),
                Err(e) => {
                    let e = SyncError::from(e);
                    self.fail(&e);
                    return SyncOutcome::Failed(e);
                }
            },
        };

        self.enter_syncing();
        match self.reconcile(&local).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&e);
                SyncOutcome::Failed(e)
            }
        }
    }

    /// Settles the pending conflict with `strategy`.
    pub async fn resolve_conflict(&self, strategy: ResolutionStrategy) -> SyncOutcome {
        if !self.status.snapshot().phase.is_conflict() {
            return SyncOutcome::Failed(SyncError::NoConflict);
        }
        if let Err(e) = self.ensure_ready() {
            debug!("Resolution refused: {e}");
            return SyncOutcome::Failed(e);
        }
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return SyncOutcome::Failed(e),
        };
        let Some(conflict) = self.status.snapshot().conflict().cloned() else {
            return SyncOutcome::Failed(SyncError::NoConflict);
        };

        let resolved = match strategy {
            ResolutionStrategy::PreferRemote => conflict.remote.clone(),
            ResolutionStrategy::PreferLocal => conflict.local.clone(),
            ResolutionStrategy::MergeProgressive => {
                merge_progressive(&conflict.local, &conflict.remote, Timestamp::now())
            }
        };

        match self.persist_both(&resolved).await {
            Ok(()) => {
                self.mark_synced();
                info!("Conflict resolved ({strategy})");
                if resolved == conflict.local {
                    SyncOutcome::Synced
                } else {
                    SyncOutcome::ReloadRequired
                }
            }
            Err(e) => {
                self.fail(&e);
                SyncOutcome::Failed(e)
            }
        }
    }

    /// Overwrites the remote document with `doc`, skipping conflict checks.
    pub async fn force_upload(&self, doc: &PersistedState) -> SyncOutcome {
        if let Err(e) = self.ensure_ready() {
            return SyncOutcome::Failed(e);
        }
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return SyncOutcome::Failed(e),
        };

        match self.with_timeout(self.remote.save(doc)).await {
            Ok(()) => {
                self.record_sync(Timestamp::now());
                info!("Forced upload complete");
                SyncOutcome::Synced
            }
            Err(e) => {
                warn!("Forced upload failed: {e}");
                SyncOutcome::Failed(e)
            }
        }
    }

    /// Replaces the local document with the remote one.
    pub async fn force_download(&self) -> SyncOutcome {
        if let Err(e) = self.ensure_ready() {
            return SyncOutcome::Failed(e);
        }
        let _guard = match self.begin() {
            Ok(guard) => guard,
            Err(e) => return SyncOutcome::Failed(e),
        };

        let result = self.download().await;
        match &result {
            Ok(_) => {
                self.record_sync(Timestamp::now());
                info!("Forced download complete");
            }
            Err(e) => warn!("Forced download failed: {e}"),
        }
        result.into()
    }

    /// Queues `doc` for the next reconnect. A later call replaces it.
    pub fn queue_pending_changes(&self, doc: PersistedState) {
        *self.pending_slot() = Some(doc);
        debug!("Queued pending changes");
    }

    // ── Connectivity ────────────────────────────────────────────

    /// Enters the offline phase from any phase.
    pub fn connectivity_lost(&self) {
        self.online.store(false, Ordering::SeqCst);
        let changed = self.status.update(|status| {
            if status.phase.is_offline() {
                return false;
            }
            status.phase = SyncPhase::Offline;
            true
        });
        if changed {
            info!("Connectivity lost");
        }
    }

    /// Leaves the offline phase and flushes the pending slot, if any.
    ///
    /// Returns the outcome of the flush attempt.
    pub async fn connectivity_restored(&self) -> Option<SyncOutcome> {
        self.online.store(true, Ordering::SeqCst);
        let changed = self.status.update(|status| {
            if !status.phase.is_offline() {
                return false;
            }
            status.phase = SyncPhase::Idle;
            true
        });
        if changed {
            info!("Connectivity restored");
        }

        let pending = self.pending_slot().take()?;
        let outcome = self.sync_now(Some(pending.clone())).await;
        if let SyncOutcome::Failed(
            SyncError::Unauthenticated | SyncError::Offline | SyncError::SyncInProgress,
        ) = &outcome
        {
            let mut slot = self.pending_slot();
            if slot.is_none() {
                *slot = Some(pending);
            }
        }
        Some(outcome)
    }

    // ── Internals ───────────────────────────────────────────────

    async fn reconcile(&self, local: &PersistedState) -> SyncResult<SyncOutcome> {
        let Some(remote) = self.with_timeout(self.remote.load()).await? else {
            debug!("No remote save, uploading local");
            self.with_timeout(self.remote.save(local)).await?;
            self.mark_synced();
            info!("Uploaded local save");
            return Ok(SyncOutcome::Synced);
        };

        let now = Timestamp::now();
        if let Some(conflict) = detect_conflict(local, &remote, &self.config.conflict, now) {
            info!(
                "Conflict detected (local {}, remote {})",
                conflict.local_timestamp, conflict.remote_timestamp
            );
            self.enter_conflict(conflict);
            return Ok(SyncOutcome::Conflict);
        }

        let merged = merge_latest(local, &remote, now);
        self.persist_both(&merged).await?;
        self.mark_synced();
        info!("Sync complete");

        Ok(if &merged == local {
            SyncOutcome::Synced
        } else {
            SyncOutcome::ReloadRequired
        })
    }

    async fn download(&self) -> SyncResult<SyncOutcome> {
        let remote = self
            .with_timeout(self.remote.load())
            .await?
            .ok_or(SyncError::RemoteNotFound)?;
        self.local.save(&remote)?;
        Ok(SyncOutcome::ReloadRequired)
    }

    /// Local write first, then remote.
    async fn persist_both(&self, doc: &PersistedState) -> SyncResult<()> {
        self.local.save(doc)?;
        self.with_timeout(self.remote.save(doc)).await
    }

    async fn with_timeout<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        tokio::time::timeout(self.config.network_timeout(), call)
            .await
            .map_err(|_| SyncError::Timeout)?
    }

    fn ensure_ready(&self) -> SyncResult<()> {
        if !self.credentials.is_authenticated() {
            return Err(SyncError::Unauthenticated);
        }
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        Ok(())
    }

    fn begin(&self) -> SyncResult<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| FlightGuard(&self.in_flight))
            .map_err(|_| SyncError::SyncInProgress)
    }

    fn pending_slot(&self) -> std::sync::MutexGuard<'_, Option<PersistedState>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Transitions below leave an offline phase alone; only a reconnect ends it.

    fn enter_syncing(&self) {
        self.status.update(|status| {
            if !self.is_online() {
                return false;
            }
            status.phase = SyncPhase::Syncing;
            true
        });
        debug!("Phase -> syncing");
    }

    fn enter_conflict(&self, conflict: ConflictSnapshot) {
        // The one exception: a conflict also replaces an offline phase.
        self.status.update(|status| {
            status.phase = SyncPhase::Conflict(Box::new(conflict));
            status.last_error = None;
            true
        });
        debug!("Phase -> conflict");
    }

    fn fail(&self, error: &SyncError) {
        warn!("Sync failed: {error}");
        self.status.update(|status| {
            if !self.is_online() {
                return false;
            }
            status.phase = SyncPhase::Error;
            status.last_error = Some(error.to_string());
            true
        });
    }

    fn mark_synced(&self) {
        let now = Timestamp::now();
        self.persist_last_sync(now);
        self.status.update(|status| {
            status.last_sync_at = Some(now);
            status.last_error = None;
            if self.is_online() {
                status.phase = SyncPhase::Idle;
            }
            true
        });
        debug!("Phase -> idle");
    }

    /// Stamps the sync time without touching the phase.
    fn record_sync(&self, now: Timestamp) {
        self.persist_last_sync(now);
        self.status.update(|status| {
            status.last_sync_at = Some(now);
            true
        });
    }

    fn persist_last_sync(&self, now: Timestamp) {
        if let Err(e) = self.meta.set(keys::LAST_SYNC_AT, &now.to_rfc3339()) {
            warn!("Failed to persist last sync time: {e}");
        }
    }
}
