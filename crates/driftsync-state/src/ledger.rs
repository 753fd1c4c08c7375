//! Progress ledger: which paths the current run has already committed
//!
//! Rewritten after every committed batch and deletion group; a path
//! listed here is excluded from planning on resume, so an interrupted
//! run picks up where it stopped without repeating transfers. The file
//! is deleted once a run finishes cleanly.

use driftsync_types::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// Per-run record of committed work, persisted as pretty-printed JSON
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressLedger {
    /// Paths pushed to the remote and checkpointed
    pub pushed: BTreeSet<String>,
    /// Paths pulled from the remote and checkpointed
    pub pulled: BTreeSet<String>,
    /// Paths deleted on the remote
    #[serde(rename = "deleted_r")]
    pub deleted_remote: BTreeSet<String>,
    /// Paths deleted locally
    #[serde(rename = "deleted_l")]
    pub deleted_local: BTreeSet<String>,
}

impl ProgressLedger {
    /// Load the ledger; a missing or unparsable file yields an empty
    /// ledger (no resume, full plan)
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&text) {
            Ok(ledger) => ledger,
            Err(error) => {
                warn!(
                    "progress ledger {} is unparsable ({error}), discarding it",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Persist the ledger, via a sibling temp file and rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|error| driftsync_types::Error::other(error.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        debug!("checkpointed progress ledger ({} entries)", self.total());
        Ok(())
    }

    /// Delete the ledger file after a clean finish, tolerating absence
    pub fn clear(path: &Path) {
        if let Err(error) = std::fs::remove_file(path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!("cannot remove progress ledger {}: {error}", path.display());
            }
        }
    }

    /// Whether any work has been recorded
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Total number of recorded paths across all categories
    pub fn total(&self) -> usize {
        self.pushed.len() + self.pulled.len() + self.deleted_remote.len() + self.deleted_local.len()
    }

    /// Whether a push of this path was already committed
    pub fn was_pushed(&self, rel: &str) -> bool {
        self.pushed.contains(rel)
    }

    /// Whether a pull of this path was already committed
    pub fn was_pulled(&self, rel: &str) -> bool {
        self.pulled.contains(rel)
    }

    /// Whether a remote deletion of this path was already committed
    pub fn was_deleted_remote(&self, rel: &str) -> bool {
        self.deleted_remote.contains(rel)
    }

    /// Whether a local deletion of this path was already committed
    pub fn was_deleted_local(&self, rel: &str) -> bool {
        self.deleted_local.contains(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_with_wire_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".sync_progress.json");

        let mut ledger = ProgressLedger::default();
        ledger.pushed.insert("a.txt".to_string());
        ledger.deleted_remote.insert("gone.txt".to_string());
        ledger.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"deleted_r\""));
        assert!(text.contains("\"deleted_l\""));

        let reloaded = ProgressLedger::load(&path);
        assert!(reloaded.was_pushed("a.txt"));
        assert!(reloaded.was_deleted_remote("gone.txt"));
        assert!(!reloaded.was_pulled("a.txt"));
    }

    #[test]
    fn test_missing_and_corrupt_files_yield_empty_ledger() {
        let dir = TempDir::new().unwrap();
        assert!(ProgressLedger::load(&dir.path().join("absent")).is_empty());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "][").unwrap();
        assert!(ProgressLedger::load(&path).is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(&path, r#"{"pushed": ["x"]}"#).unwrap();

        let ledger = ProgressLedger::load(&path);
        assert!(ledger.was_pushed("x"));
        assert!(ledger.deleted_local.is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("p.json");
        ProgressLedger::default().save(&path).unwrap();
        ProgressLedger::clear(&path);
        assert!(!path.exists());
        ProgressLedger::clear(&path);
    }
}
