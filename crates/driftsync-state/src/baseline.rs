//! Baseline table: last agreed metadata per path
//!
//! Stored as a TSV table with a header row, one row per path, sorted for
//! stable diffs. Older deployments persisted the same data as a single
//! JSON object; that format is still accepted on load and rewritten as
//! TSV on the next save.

use driftsync_types::{FileMeta, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

const HEADER: &str = "path\tlmtime\tlsize\trmtime\trsize";

/// Metadata both replicas agreed on for one path at the end of the last
/// successful synchronization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Local modification time, seconds since the epoch
    #[serde(rename = "lmtime")]
    pub local_mtime: f64,
    /// Local size in bytes
    #[serde(rename = "lsize")]
    pub local_size: u64,
    /// Remote modification time, seconds since the epoch
    #[serde(rename = "rmtime")]
    pub remote_mtime: f64,
    /// Remote size in bytes
    #[serde(rename = "rsize")]
    pub remote_size: u64,
}

impl StateRecord {
    /// Build a record from the two sides' current metadata
    pub fn from_sides(local: FileMeta, remote: FileMeta) -> Self {
        Self {
            local_mtime: local.mtime,
            local_size: local.size,
            remote_mtime: remote.mtime,
            remote_size: remote.size,
        }
    }

    /// Baseline metadata for the local side
    pub fn local(&self) -> FileMeta {
        FileMeta::new(self.local_mtime, self.local_size)
    }

    /// Baseline metadata for the remote side
    pub fn remote(&self) -> FileMeta {
        FileMeta::new(self.remote_mtime, self.remote_size)
    }
}

/// The persisted baseline table
#[derive(Debug, Default, Clone)]
pub struct SyncState {
    records: BTreeMap<String, StateRecord>,
}

impl SyncState {
    /// Load the table from disk.
    ///
    /// A missing file yields an empty table (first run). An unparsable
    /// file also yields an empty table with a warning; treating every
    /// path as never-synced errs toward conflict detection rather than
    /// silent overwrites.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                debug!("no baseline table at {}, starting fresh", path.display());
                return Self::default();
            }
        };

        let records = if text.trim_start().starts_with('{') {
            Self::parse_legacy_json(&text)
        } else {
            Self::parse_tsv(&text)
        };
        match records {
            Some(records) => {
                debug!("loaded {} baseline records", records.len());
                Self { records }
            }
            None => {
                warn!(
                    "baseline table {} is unparsable, treating all paths as never synced",
                    path.display()
                );
                Self::default()
            }
        }
    }

    fn parse_tsv(text: &str) -> Option<BTreeMap<String, StateRecord>> {
        let mut lines = text.lines();
        if lines.next()?.trim_end() != HEADER {
            return None;
        }
        let mut records = BTreeMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 5 {
                return None;
            }
            let record = StateRecord {
                local_mtime: fields[1].parse().ok()?,
                local_size: fields[2].parse().ok()?,
                remote_mtime: fields[3].parse().ok()?,
                remote_size: fields[4].parse().ok()?,
            };
            records.insert(fields[0].to_string(), record);
        }
        Some(records)
    }

    fn parse_legacy_json(text: &str) -> Option<BTreeMap<String, StateRecord>> {
        serde_json::from_str(text).ok()
    }

    /// Write the table to disk, via a sibling temp file and rename so a
    /// crash mid-write never truncates the previous table
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = String::with_capacity(64 * (self.records.len() + 1));
        text.push_str(HEADER);
        text.push('\n');
        for (rel, record) in &self.records {
            let _ = writeln!(
                text,
                "{rel}\t{}\t{}\t{}\t{}",
                record.local_mtime, record.local_size, record.remote_mtime, record.remote_size
            );
        }

        let tmp = path.with_extension("tsv.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, path)?;
        debug!("saved {} baseline records", self.records.len());
        Ok(())
    }

    /// Baseline record for a path, if it was ever synchronized
    pub fn get(&self, rel: &str) -> Option<&StateRecord> {
        self.records.get(rel)
    }

    /// Record the agreed metadata for a path
    pub fn record(&mut self, rel: &str, local: FileMeta, remote: FileMeta) {
        self.records
            .insert(rel.to_string(), StateRecord::from_sides(local, remote));
    }

    /// Drop the record for a path (it was deleted on both sides)
    pub fn forget(&mut self, rel: &str) {
        self.records.remove(rel);
    }

    /// Number of recorded paths
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over recorded paths in sorted order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> SyncState {
        let mut state = SyncState::default();
        state.record(
            "a.txt",
            FileMeta::new(1_700_000_000.5, 10),
            FileMeta::new(1_700_000_001.0, 10),
        );
        state.record(
            "sub/b.bin",
            FileMeta::new(1_700_000_050.0, 2048),
            FileMeta::new(1_700_000_050.0, 2048),
        );
        state
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".sync_state.tsv");
        sample().save(&path).unwrap();

        let reloaded = SyncState::load(&path);
        assert_eq!(reloaded.len(), 2);
        let record = reloaded.get("a.txt").unwrap();
        assert!((record.local_mtime - 1_700_000_000.5).abs() < f64::EPSILON);
        assert_eq!(record.remote_size, 10);
    }

    #[test]
    fn test_missing_file_is_empty_table() {
        let dir = TempDir::new().unwrap();
        assert!(SyncState::load(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_legacy_json_object_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        std::fs::write(
            &path,
            r#"{"doc.txt": {"lmtime": 1.5, "lsize": 3, "rmtime": 2.5, "rsize": 3}}"#,
        )
        .unwrap();

        let state = SyncState::load(&path);
        let record = state.get("doc.txt").unwrap();
        assert!((record.remote_mtime - 2.5).abs() < f64::EPSILON);
        assert_eq!(record.local_size, 3);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        std::fs::write(&path, "not a table\nat all").unwrap();
        assert!(SyncState::load(&path).is_empty());
    }

    #[test]
    fn test_forget_removes_record() {
        let mut state = sample();
        state.forget("a.txt");
        assert!(state.get("a.txt").is_none());
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_save_replaces_previous_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state");
        sample().save(&path).unwrap();

        let mut state = SyncState::load(&path);
        state.forget("sub/b.bin");
        state.save(&path).unwrap();

        assert_eq!(SyncState::load(&path).len(), 1);
    }
}
