//! Sync status and its publisher.
//!
//! The conflict payload is reachable only through [`SyncPhase::Conflict`], so
//! a status can never claim a conflict in any other phase.

use savesync_types::{PersistedState, Timestamp};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Both sides of a detected conflict, captured verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSnapshot {
    pub local: PersistedState,
    pub remote: PersistedState,
    pub local_timestamp: Timestamp,
    pub remote_timestamp: Timestamp,
}

/// The single active state of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", content = "conflict", rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Conflict(Box<ConflictSnapshot>),
    Error,
    Offline,
}

impl SyncPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Syncing => "syncing",
            SyncPhase::Conflict(_) => "conflict",
            SyncPhase::Error => "error",
            SyncPhase::Offline => "offline",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SyncPhase::Idle)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncPhase::Conflict(_))
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, SyncPhase::Offline)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A full status snapshot, as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    #[serde(flatten)]
    pub phase: SyncPhase,
    pub last_sync_at: Option<Timestamp>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    pub fn new(phase: SyncPhase, last_sync_at: Option<Timestamp>) -> Self {
        Self {
            phase,
            last_sync_at,
            last_error: None,
        }
    }

    /// The captured conflict, present iff the phase is `conflict`.
    pub fn conflict(&self) -> Option<&ConflictSnapshot> {
        match &self.phase {
            SyncPhase::Conflict(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Callback invoked with each status snapshot.
pub type Observer = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

struct Registry {
    status: SyncStatus,
    observers: Vec<(u64, Observer)>,
    next_id: u64,
    /// Snapshots waiting for delivery, oldest first.
    queue: VecDeque<Delivery>,
    /// Set while some caller is draining `queue`.
    delivering: bool,
}

enum Delivery {
    /// A change, for the observers registered when it was made.
    Change(SyncStatus, Vec<u64>),
    /// The first snapshot of a new observer.
    Initial(SyncStatus, u64),
}

impl Registry {
    fn observer(&self, id: u64) -> Option<Observer> {
        self.observers
            .iter()
            .find(|(oid, _)| *oid == id)
            .map(|(_, o)| Arc::clone(o))
    }
}

/// Owns the current [`SyncStatus`] and delivers every change to observers.
///
/// Snapshots are queued and delivered by one caller at a time, in the order
/// the changes were made. A call made from inside an observer (reading the
/// status, publishing a change, subscribing, dropping a [`Subscription`])
/// never blocks: nested changes are queued and delivered after the current
/// callback returns.
pub struct StatusPublisher {
    registry: Arc<Mutex<Registry>>,
}

impl StatusPublisher {
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                status: initial,
                observers: Vec::new(),
                next_id: 0,
                queue: VecDeque::new(),
                delivering: false,
            })),
        }
    }

    /// Returns a copy of the current status.
    pub fn snapshot(&self) -> SyncStatus {
        lock(&self.registry).status.clone()
    }

    /// Registers `observer` and delivers the current status to it once.
    #[must_use = "dropping the subscription unsubscribes the observer"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let observer: Observer = Arc::new(observer);
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.observers.push((id, observer));
            let current = registry.status.clone();
            registry.queue.push_back(Delivery::Initial(current, id));
            id
        };
        self.drain();
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
        }
    }

    /// Applies `change` to the status and queues the new snapshot when it
    /// reports a change.
    ///
    /// Unless another caller is already delivering, the queue is drained
    /// before this returns.
    pub fn update<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut SyncStatus) -> bool,
    {
        {
            let mut registry = lock(&self.registry);
            if !change(&mut registry.status) {
                return false;
            }
            let ids = registry.observers.iter().map(|(id, _)| *id).collect();
            let snapshot = registry.status.clone();
            registry.queue.push_back(Delivery::Change(snapshot, ids));
        }
        self.drain();
        true
    }

    /// Delivers queued snapshots until the queue is empty. Returns at once
    /// when another caller is already draining.
    fn drain(&self) {
        {
            let mut registry = lock(&self.registry);
            if registry.delivering {
                return;
            }
            registry.delivering = true;
        }
        let mut draining = DrainGuard(Some(&self.registry));

        loop {
            let (snapshot, targets) = {
                let mut registry = lock(&self.registry);
                match registry.queue.pop_front() {
                    None => {
                        // Released under the same lock that saw the empty queue.
                        registry.delivering = false;
                        draining.0 = None;
                        return;
                    }
                    Some(Delivery::Initial(snapshot, id)) => {
                        let targets: Vec<Observer> = registry.observer(id).into_iter().collect();
                        (snapshot, targets)
                    }
                    Some(Delivery::Change(snapshot, ids)) => {
                        let targets: Vec<Observer> =
                            ids.into_iter().filter_map(|id| registry.observer(id)).collect();
                        (snapshot, targets)
                    }
                }
            };
            for observer in targets {
                observer(&snapshot);
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.registry).observers.len()
    }
}

/// Handle returned by [`StatusPublisher::subscribe`]. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    id: u64,
}

impl Subscription {
    /// Stops further deliveries to the observer.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).observers.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Clears the delivering flag if an observer panics mid-drain.
struct DrainGuard<'a>(Option<&'a Mutex<Registry>>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if let Some(registry) = self.0 {
            lock(registry).delivering = false;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
