//! Merge strategies for save documents.

use crate::conflict::representative_timestamp;
use savesync_types::{Analytics, PersistedState, Timestamp};
use std::collections::{BTreeMap, HashSet};

/// Unions two histories. `newer` wins on every field except the cycle and
/// map-result lists: every entry of `newer` is kept, plus the entries of
/// `older` whose key (cycle start, map end) does not occur in `newer`. Both
/// lists come out sorted ascending by key; equal keys keep their input order.
pub fn merge_analytics(newer: &Analytics, older: &Analytics) -> Analytics {
    let known: HashSet<_> = newer.cycles.iter().map(|c| c.started_at).collect();
    let mut cycles: Vec<_> = newer
        .cycles
        .iter()
        .chain(older.cycles.iter().filter(|c| !known.contains(&c.started_at)))
        .cloned()
        .collect();
    cycles.sort_by_key(|c| c.started_at);

    let known: HashSet<_> = newer.map_results.iter().map(|m| m.ended_at).collect();
    let mut map_results: Vec<_> = newer
        .map_results
        .iter()
        .chain(older.map_results.iter().filter(|m| !known.contains(&m.ended_at)))
        .cloned()
        .collect();
    map_results.sort_by_key(|m| m.ended_at);

    Analytics {
        cycles,
        map_results,
        extra: newer.extra.clone(),
    }
}

/// Latest-wins merge used when no conflict was detected.
///
/// The save with the later representative timestamp is kept whole (ties go to
/// `remote`), with its analytics unioned with the other save's.
pub fn merge_latest(local: &PersistedState, remote: &PersistedState, now: Timestamp) -> PersistedState {
    let (newer, older) = order_by_recency(local, remote, now);
    PersistedState {
        analytics: merge_analytics(&newer.analytics, &older.analytics),
        ..newer.clone()
    }
}

/// Field-wise maximum used by the `merge-progressive` resolution.
///
/// Starts from `local`. Character level/XP, the level/XP of every local gem
/// that also exists remotely, and every currency balance take the larger
/// value. Gems only present in `remote` are not carried over.
pub fn merge_progressive(
    local: &PersistedState,
    remote: &PersistedState,
    now: Timestamp,
) -> PersistedState {
    let mut merged = local.clone();

    merged.character.level = local.character.level.max(remote.character.level);
    merged.character.xp = local.character.xp.max(remote.character.xp);

    for gem in &mut merged.gems {
        if let Some(other) = remote.gem(&gem.id) {
            gem.level = gem.level.max(other.level);
            gem.xp = gem.xp.max(other.xp);
        }
    }

    let mut currency = BTreeMap::new();
    for key in local.currency.keys().chain(remote.currency.keys()) {
        let ours = local.currency.get(key).copied().unwrap_or(0.0);
        let theirs = remote.currency.get(key).copied().unwrap_or(0.0);
        currency.insert(key.clone(), ours.max(theirs));
    }
    merged.currency = currency;

    let (newer, older) = order_by_recency(local, remote, now);
    merged.analytics = merge_analytics(&newer.analytics, &older.analytics);

    merged
}

fn order_by_recency<'a>(
    local: &'a PersistedState,
    remote: &'a PersistedState,
    now: Timestamp,
) -> (&'a PersistedState, &'a PersistedState) {
    if representative_timestamp(local, now) > representative_timestamp(remote, now) {
        (local, remote)
    } else {
        (remote, local)
    }
}
