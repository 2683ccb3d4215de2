mod common;

use common::*;
use pretty_assertions::assert_eq;
use savesync_sync::{merge_analytics, merge_latest, merge_progressive};
use savesync_types::{Analytics, CycleRecord, Gem, MapResult, PersistedState};
use serde_json::json;

fn cycle(start: i64) -> CycleRecord {
    CycleRecord::new(at(start), Some(at(start + 60)))
}

fn starts(analytics: &Analytics) -> Vec<i64> {
    analytics
        .cycles
        .iter()
        .map(|c| (c.started_at.as_millis() - base_time().as_millis()) / 1000)
        .collect()
}

// ── Analytics union ──────────────────────────────────────────────

#[test]
fn union_adds_missing_cycles_sorted() {
    let newer = Analytics {
        cycles: vec![cycle(300), cycle(100)],
        ..Default::default()
    };
    let older = Analytics {
        cycles: vec![cycle(200), cycle(100)],
        ..Default::default()
    };

    let merged = merge_analytics(&newer, &older);

    assert_eq!(starts(&merged), vec![100, 200, 300]);
}

#[test]
fn union_keeps_newer_entry_on_duplicate_key() {
    let mut mine = cycle(100);
    mine.extra.insert("studySeconds".into(), json!(900));
    let mut theirs = cycle(100);
    theirs.extra.insert("studySeconds".into(), json!(10));

    let merged = merge_analytics(
        &Analytics {
            cycles: vec![mine.clone()],
            ..Default::default()
        },
        &Analytics {
            cycles: vec![theirs],
            ..Default::default()
        },
    );

    assert_eq!(merged.cycles, vec![mine]);
}

#[test]
fn union_keeps_newer_cycles_sharing_a_start() {
    let mut math = cycle(100);
    math.extra.insert("subject".into(), json!("math"));
    let mut bio = cycle(100);
    bio.extra.insert("subject".into(), json!("bio"));
    let newer = Analytics {
        cycles: vec![math.clone(), bio.clone()],
        ..Default::default()
    };
    let older = Analytics {
        cycles: vec![cycle(100), cycle(40)],
        ..Default::default()
    };

    let merged = merge_analytics(&newer, &older);

    assert_eq!(merged.cycles, vec![cycle(40), math, bio]);
}

#[test]
fn map_results_dedup_by_end_time() {
    let newer = Analytics {
        map_results: vec![MapResult::new(at(50))],
        ..Default::default()
    };
    let older = Analytics {
        map_results: vec![MapResult::new(at(10)), MapResult::new(at(50))],
        ..Default::default()
    };

    let merged = merge_analytics(&newer, &older);

    let ends: Vec<_> = merged.map_results.iter().map(|m| m.ended_at).collect();
    assert_eq!(ends, vec![at(10), at(50)]);
}

#[test]
fn union_takes_other_fields_from_newer() {
    let mut newer = Analytics::default();
    newer.extra.insert("streak".into(), json!(7));
    let mut older = Analytics::default();
    older.extra.insert("streak".into(), json!(2));
    older.extra.insert("legacy".into(), json!(true));

    let merged = merge_analytics(&newer, &older);

    assert_eq!(merged.extra.get("streak"), Some(&json!(7)));
    assert!(merged.extra.get("legacy").is_none());
}

// ── Latest wins ──────────────────────────────────────────────────

#[test]
fn latest_wins_keeps_newer_fields() {
    let mut local = state_at(5, 100.0, 0);
    local.currency.insert("gold".into(), 500.0);
    let mut remote = state_at(6, 50.0, 30);
    remote.currency.insert("gold".into(), 10.0);

    let merged = merge_latest(&local, &remote, at(0));

    assert_eq!(merged.character.level, 6);
    assert_eq!(merged.character.xp, 50.0);
    assert_eq!(merged.currency.get("gold"), Some(&10.0));
    assert_eq!(merged.cycle_count(), 2);
}

#[test]
fn latest_wins_tie_goes_to_remote() {
    let local = PersistedState::new(5, 100.0);
    let remote = PersistedState::new(5, 120.0);

    let merged = merge_latest(&local, &remote, at(0));

    assert_eq!(merged.character.xp, 120.0);
}

#[test]
fn latest_wins_with_itself_is_identity() {
    let mut state = state_at(5, 100.0, 0);
    state.analytics.cycles.insert(0, cycle(-5000));
    state.gems.push(Gem::new("math", 2, 40.0));

    assert_eq!(merge_latest(&state, &state, at(0)), state);
}

#[test]
fn latest_wins_with_itself_keeps_same_start_cycles() {
    let mut state = PersistedState::new(3, 10.0);
    for subject in ["math", "bio"] {
        let mut record = cycle(100);
        record.extra.insert("subject".into(), json!(subject));
        state.analytics.cycles.push(record);
    }

    let merged = merge_latest(&state, &state, at(0));

    assert_eq!(merged.analytics.cycles.len(), 2);
    assert_eq!(merged, state);
}

// ── Progressive ──────────────────────────────────────────────────

#[test]
fn progressive_takes_field_wise_maximum() {
    let mut local = state_at(7, 500.0, 0);
    local.gems.push(Gem::new("math", 3, 10.0));
    local.gems.push(Gem::new("art", 1, 90.0));
    local.currency.insert("gold".into(), 100.0);

    let mut remote = state_at(5, 2000.0, 3600);
    remote.gems.push(Gem::new("math", 2, 70.0));
    remote.currency.insert("gold".into(), 40.0);
    remote.currency.insert("gems".into(), 3.0);

    let merged = merge_progressive(&local, &remote, at(0));

    assert_eq!(merged.character.level, 7);
    assert_eq!(merged.character.xp, 2000.0);
    let math = merged.gem("math").unwrap();
    assert_eq!((math.level, math.xp), (3, 70.0));
    let art = merged.gem("art").unwrap();
    assert_eq!((art.level, art.xp), (1, 90.0));
    assert_eq!(merged.currency.get("gold"), Some(&100.0));
    assert_eq!(merged.currency.get("gems"), Some(&3.0));
    assert_eq!(merged.cycle_count(), 2);
}

#[test]
fn progressive_drops_remote_only_gems() {
    let local = PersistedState::new(1, 0.0);
    let mut remote = PersistedState::new(1, 0.0);
    remote.gems.push(Gem::new("science", 4, 10.0));

    let merged = merge_progressive(&local, &remote, at(0));

    assert!(merged.gems.is_empty());
}

#[test]
fn progressive_missing_currency_counts_as_zero() {
    let mut local = PersistedState::new(1, 0.0);
    local.currency.insert("debt".into(), -5.0);
    let remote = PersistedState::new(1, 0.0);

    let merged = merge_progressive(&local, &remote, at(0));

    assert_eq!(merged.currency.get("debt"), Some(&0.0));
}

#[test]
fn progressive_keeps_local_unmodelled_fields() {
    let mut local = PersistedState::new(1, 0.0);
    local.extra.insert("settings".into(), json!({"sound": false}));
    let mut remote = PersistedState::new(2, 0.0);
    remote.extra.insert("settings".into(), json!({"sound": true}));

    let merged = merge_progressive(&local, &remote, at(0));

    assert_eq!(merged.extra.get("settings"), Some(&json!({"sound": false})));
    assert_eq!(merged.character.level, 2);
}
