//! Interval-driven auto-sync bound to the credential lifetime.
//!
//! While signed in, the scheduler fires one attempt shortly after sign-in and
//! then one per interval, skipping ticks unless the engine is idle and online.
//! Signing out stops the ticks; an attempt already running is awaited, never
//! cancelled.

use crate::auth::Credential;
use crate::engine::{SyncEngine, SyncOutcome};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Handle to the background auto-sync task. Dropping it aborts the task;
/// [`AutoSync::stop`] shuts it down after any running attempt.
pub struct AutoSync {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

enum TickExit {
    Shutdown,
    SignedOut,
}

impl AutoSync {
    /// Spawns the scheduler onto the current tokio runtime.
    pub fn spawn(engine: Arc<SyncEngine>) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let credentials = engine.credentials().subscribe();
        let task = tokio::spawn(supervise(engine, credentials, shutdown_rx));
        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the scheduler, waiting for a running attempt to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Auto-sync task ended abnormally: {e}");
                }
            }
        }
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn supervise(
    engine: Arc<SyncEngine>,
    mut credentials: watch::Receiver<Credential>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let authenticated = credentials.borrow_and_update().is_authenticated();
        if authenticated {
            match run_ticks(&engine, &mut credentials, &mut shutdown).await {
                TickExit::Shutdown => return,
                TickExit::SignedOut => info!("Auto-sync stopped (signed out)"),
            }
            continue;
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => return,
            changed = credentials.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_ticks(
    engine: &SyncEngine,
    credentials: &mut watch::Receiver<Credential>,
    shutdown: &mut oneshot::Receiver<()>,
) -> TickExit {
    let period = engine.config().auto_sync_interval();
    let first = tokio::time::sleep(engine.config().initial_sync_delay());
    tokio::pin!(first);
    let mut first_done = false;

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Auto-sync started (every {}s)", period.as_secs());

    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => return TickExit::Shutdown,
            changed = credentials.changed() => {
                if changed.is_err() {
                    return TickExit::Shutdown;
                }
                if !credentials.borrow_and_update().is_authenticated() {
                    return TickExit::SignedOut;
                }
            }
            _ = &mut first, if !first_done => {
                first_done = true;
                if engine.is_online() {
                    attempt(engine, "initial").await;
                }
            }
            _ = ticker.tick() => {
                if engine.is_online() && engine.status().phase.is_idle() {
                    attempt(engine, "scheduled").await;
                } else {
                    debug!("Skipping auto-sync tick ({})", engine.status().phase);
                }
            }
        }
    }
}

async fn attempt(engine: &SyncEngine, trigger: &str) {
    match engine.sync_now(None).await {
        SyncOutcome::Failed(e) if e.is_expected() => debug!("{trigger} sync skipped: {e}"),
        SyncOutcome::Failed(e) => warn!("{trigger} sync failed: {e}"),
        SyncOutcome::Conflict => info!("{trigger} sync found a conflict"),
        outcome => debug!("{trigger} sync finished: {outcome:?}"),
    }
}
