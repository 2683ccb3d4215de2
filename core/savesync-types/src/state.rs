//! The persisted save document.

use crate::{Result, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The application's save document.
///
/// Fields not modelled here are kept verbatim in `extra` and written back
/// unchanged, so the sync engine never strips data it does not understand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub character: Character,
    #[serde(default)]
    pub gems: Vec<Gem>,
    #[serde(default)]
    pub currency: BTreeMap<String, f64>,
    #[serde(default)]
    pub analytics: Analytics,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PersistedState {
    /// Creates a document with the given character progress and nothing else.
    pub fn new(level: u32, xp: f64) -> Self {
        Self {
            character: Character::new(level, xp),
            gems: Vec::new(),
            currency: BTreeMap::new(),
            analytics: Analytics::default(),
            extra: Map::new(),
        }
    }

    /// Parses a document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the document to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Number of recorded study cycles.
    pub fn cycle_count(&self) -> usize {
        self.analytics.cycles.len()
    }

    /// The cycle with the latest start time, if any.
    pub fn latest_cycle(&self) -> Option<&CycleRecord> {
        self.analytics.cycles.iter().max_by_key(|c| c.started_at)
    }

    /// Sum of the `studySeconds` recorded on each cycle.
    pub fn total_study_seconds(&self) -> f64 {
        self.analytics
            .cycles
            .iter()
            .filter_map(|c| c.extra.get("studySeconds").and_then(Value::as_f64))
            .sum()
    }

    /// Looks up a gem by id.
    pub fn gem(&self, id: &str) -> Option<&Gem> {
        self.gems.iter().find(|g| g.id == id)
    }
}

/// Character progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub level: u32,
    #[serde(default)]
    pub xp: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Character {
    pub fn new(level: u32, xp: f64) -> Self {
        Self {
            level,
            xp,
            extra: Map::new(),
        }
    }
}

/// A subject gem with its own level and experience.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gem {
    pub id: String,
    pub level: u32,
    #[serde(default)]
    pub xp: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Gem {
    pub fn new(id: impl Into<String>, level: u32, xp: f64) -> Self {
        Self {
            id: id.into(),
            level,
            xp,
            extra: Map::new(),
        }
    }
}

/// Study history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    #[serde(default)]
    pub cycles: Vec<CycleRecord>,
    #[serde(default)]
    pub map_results: Vec<MapResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One completed (or in-progress) study cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    #[serde(rename = "startedAtISO")]
    pub started_at: Timestamp,
    #[serde(
        rename = "endedAtISO",
        default,
        deserialize_with = "optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub ended_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CycleRecord {
    pub fn new(started_at: Timestamp, ended_at: Option<Timestamp>) -> Self {
        Self {
            started_at,
            ended_at,
            extra: Map::new(),
        }
    }

    /// End time, or start time for a cycle that never finished.
    pub fn recency(&self) -> Timestamp {
        self.ended_at.unwrap_or(self.started_at)
    }
}

/// Outcome of a finished map run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapResult {
    #[serde(rename = "endedAtISO")]
    pub ended_at: Timestamp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MapResult {
    pub fn new(ended_at: Timestamp) -> Self {
        Self {
            ended_at,
            extra: Map::new(),
        }
    }
}

/// Accepts a missing, `null` or empty end time as "not finished".
fn optional_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => Timestamp::parse(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
