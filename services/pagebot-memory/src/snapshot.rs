//! Whole-snapshot JSON persistence for the conversation store.
//!
//! The entire store is rewritten on every mutation. Writes go to a sibling
//! temp file first and are renamed into place, so a crash mid-write leaves
//! the previous snapshot intact instead of a torn file.

use crate::store::Turn;
use pagebot_common::error::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Snapshot file holding the full conversation store as JSON
/// (`user_id` → turn array).
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Create a snapshot handle for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the snapshot, returning an empty map when the file is missing,
    /// unreadable, or unparseable. Load failures are logged, never
    /// propagated.
    pub fn load(&self) -> HashMap<String, Vec<Turn>> {
        if !self.path.exists() {
            return HashMap::new();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Snapshot unreadable, starting with empty memory"
                );
                return HashMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Snapshot corrupt, starting with empty memory"
                );
                HashMap::new()
            }
        }
    }

    /// Write the full store as one snapshot, atomically
    /// (write-temp-then-rename).
    pub fn save(&self, entries: &HashMap<String, Vec<Turn>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(entries)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            Error::Persistence(format!(
                "failed to move snapshot into place at {}: {e}",
                self.path.display()
            ))
        })?;

        Ok(())
    }
}
