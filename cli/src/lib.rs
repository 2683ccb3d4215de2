//! Shared pieces of the savesync command-line client.
//!
//! Kept out of `main.rs` so they can be tested without a terminal.

use anyhow::{Context, Result};
use savesync_sync::{GistConfig, Revision, SyncConfig, SyncOutcome, SyncStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk configuration file: `{ "sync": {...}, "gist": {...} }`.
/// Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub sync: SyncConfig,
    pub gist: GistConfig,
}

impl CliConfig {
    /// Reads the file at `path`, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Applies a `--device` override.
    pub fn with_device_name(mut self, device_name: Option<String>) -> Self {
        if let Some(name) = device_name {
            self.sync.device_name = name;
        }
        self
    }
}

/// One-line summary of an engine status.
pub fn describe_status(status: &SyncStatus) -> String {
    let mut line = format!("phase: {}", status.phase);
    match &status.last_sync_at {
        Some(at) => line.push_str(&format!(", last sync: {at}")),
        None => line.push_str(", never synced"),
    }
    if let Some(error) = &status.last_error {
        line.push_str(&format!(", last error: {error}"));
    }
    line
}

/// Human-readable text for a finished command.
pub fn describe_outcome(outcome: &SyncOutcome, status: &SyncStatus) -> String {
    match outcome {
        SyncOutcome::Synced => "Up to date.".to_string(),
        SyncOutcome::ReloadRequired => "Local save updated from the cloud.".to_string(),
        SyncOutcome::Conflict => match status.conflict() {
            Some(conflict) => format!(
                "Conflict: local save from {} (level {}), cloud save from {} (level {}). \
                 Re-run with --resolve prefer-local, prefer-remote or merge-progressive.",
                conflict.local_timestamp,
                conflict.local.character.level,
                conflict.remote_timestamp,
                conflict.remote.character.level,
            ),
            None => "Conflict detected.".to_string(),
        },
        SyncOutcome::Failed(e) => format!("Sync failed: {e}"),
    }
}

pub fn describe_revision(revision: &Revision) -> String {
    format!("{}  {}", revision.committed_at, revision.version)
}
