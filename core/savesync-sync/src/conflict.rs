//! Conflict detection between a local and a remote save.
//!
//! Two saves conflict when they were produced far apart in time *and*
//! diverge significantly. Timestamps alone never trigger a conflict.

use crate::status::ConflictSnapshot;
use savesync_types::{PersistedState, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning constants for [`detect_conflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictThresholds {
    /// Saves whose representative timestamps are closer than this never conflict.
    pub clock_skew_tolerance_secs: u64,
    /// Character XP difference above which saves diverge.
    pub xp_divergence: f64,
    /// Whether differing cycle counts count as divergence.
    pub compare_cycle_count: bool,
}

impl Default for ConflictThresholds {
    fn default() -> Self {
        Self {
            clock_skew_tolerance_secs: 60,
            xp_divergence: 1000.0,
            compare_cycle_count: true,
        }
    }
}

impl ConflictThresholds {
    pub fn clock_skew_tolerance(&self) -> Duration {
        Duration::from_secs(self.clock_skew_tolerance_secs)
    }
}

/// Recency marker of a save: the end (or start) of its latest cycle, else `now`.
pub fn representative_timestamp(state: &PersistedState, now: Timestamp) -> Timestamp {
    state.latest_cycle().map(|c| c.recency()).unwrap_or(now)
}

/// Level, XP or history mismatch between two saves.
pub fn has_significant_divergence(
    local: &PersistedState,
    remote: &PersistedState,
    thresholds: &ConflictThresholds,
) -> bool {
    local.character.level != remote.character.level
        || (local.character.xp - remote.character.xp).abs() > thresholds.xp_divergence
        || (thresholds.compare_cycle_count && local.cycle_count() != remote.cycle_count())
}

/// Returns the captured conflict, or `None` when the saves can be merged.
///
/// `now` stands in for the timestamp of a save without any history.
pub fn detect_conflict(
    local: &PersistedState,
    remote: &PersistedState,
    thresholds: &ConflictThresholds,
    now: Timestamp,
) -> Option<ConflictSnapshot> {
    let local_timestamp = representative_timestamp(local, now);
    let remote_timestamp = representative_timestamp(remote, now);

    if local_timestamp.abs_diff(&remote_timestamp) < thresholds.clock_skew_tolerance() {
        return None;
    }

    if !has_significant_divergence(local, remote, thresholds) {
        return None;
    }

    Some(ConflictSnapshot {
        local: local.clone(),
        remote: remote.clone(),
        local_timestamp,
        remote_timestamp,
    })
}
