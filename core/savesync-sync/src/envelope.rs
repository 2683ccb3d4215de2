//! The on-the-wire save format.
//!
//! Remote content is a pretty-printed JSON object:
//!
//! ```json
//! {
//!   "metadata": { "timestamp": "...", "version": 1, "device": "...",
//!                 "characterLevel": 5, "totalStudyTime": 120, "gameVersion": "..." },
//!   "gameState": { ... }
//! }
//! ```

use crate::error::{SyncError, SyncResult};
use savesync_types::{PersistedState, Timestamp};
use serde::{Deserialize, Serialize};

/// Envelope format version written by this build.
pub const ENVELOPE_VERSION: u32 = 1;

/// Descriptive header written alongside each save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMetadata {
    pub timestamp: Timestamp,
    pub version: u32,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub character_level: u32,
    /// Whole minutes of study across all cycles.
    #[serde(default)]
    pub total_study_time: u64,
    #[serde(default)]
    pub game_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
    pub metadata: SaveMetadata,
    pub game_state: PersistedState,
}

impl SaveEnvelope {
    /// Wraps a document with freshly generated metadata.
    pub fn wrap(state: &PersistedState, device: &str) -> Self {
        let minutes = (state.total_study_seconds() / 60.0).round().max(0.0) as u64;
        Self {
            metadata: SaveMetadata {
                timestamp: Timestamp::now(),
                version: ENVELOPE_VERSION,
                device: device.to_string(),
                character_level: state.character.level,
                total_study_time: minutes,
                game_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            game_state: state.clone(),
        }
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates remote content.
    pub fn parse(content: &str) -> SyncResult<Self> {
        let envelope: SaveEnvelope = serde_json::from_str(content)
            .map_err(|e| SyncError::MalformedDocument(format!("invalid save data format: {e}")))?;
        if envelope.metadata.version == 0 {
            return Err(SyncError::MalformedDocument(
                "save metadata version must be at least 1".to_string(),
            ));
        }
        Ok(envelope)
    }

    pub fn into_state(self) -> PersistedState {
        self.game_state
    }
}
