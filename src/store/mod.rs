use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

#[cfg(test)]
mod tests;

/// Everything that survives a restart: the last-known snapshot and the
/// last notification time per tracked username.
///
/// Owned solely by the scheduler. Read once at startup, fully
/// overwritten after each pass.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub snapshots: HashMap<String, Snapshot>,
    #[serde(default)]
    pub last_notified_at: HashMap<String, DateTime<Utc>>,
}

impl PersistedState {
    /// Load state from disk. A missing file means a fresh start, not an
    /// error; an unreadable or corrupt file is logged and treated the
    /// same way so the loop can still run.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to load state file, starting empty");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).context("Failed to read state file")?;
        serde_json::from_str(&raw).context("Failed to parse state file")
    }

    /// Save state as pretty-printed JSON so it stays human-inspectable.
    ///
    /// Uses atomic write: writes to .tmp file, fsyncs, then renames.
    /// This prevents a crash mid-write from corrupting the previous state.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize state")?;

        let tmp_path = path.with_extension("tmp");
        {
            let mut tmp_file =
                File::create(&tmp_path).context("Failed to create temporary state file")?;
            tmp_file
                .write_all(json.as_bytes())
                .context("Failed to write state data")?;
            tmp_file
                .sync_all()
                .context("Failed to sync state file to disk")?;
        }

        fs::rename(&tmp_path, path).context("Failed to rename temporary state file")?;
        Ok(())
    }

    /// Last stored snapshot for `username`, or an empty one for a user
    /// seen for the first time.
    pub fn snapshot_for(&self, username: &str) -> Snapshot {
        self.snapshots.get(username).cloned().unwrap_or_default()
    }
}
