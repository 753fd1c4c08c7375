//! Shared data structures for scan snapshots and remote operations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mtime tolerance in seconds when comparing against the baseline.
///
/// Absorbs filesystem timestamp granularity (FAT/NTFS) and modest clock
/// skew between the two hosts. Fixed, not adaptive.
pub const MTIME_TOLERANCE_SECS: f64 = 180.0;

/// Metadata for one file as captured by a scan: modification time as
/// fractional epoch seconds plus size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    /// Modification time, fractional seconds since the Unix epoch
    pub mtime: f64,
    /// File size in bytes
    pub size: u64,
}

impl FileMeta {
    /// Create a new file metadata record
    pub fn new(mtime: f64, size: u64) -> Self {
        Self { mtime, size }
    }

    /// Build metadata from local filesystem metadata
    pub fn from_fs(metadata: &std::fs::Metadata) -> Self {
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());
        Self {
            mtime,
            size: metadata.len(),
        }
    }

    /// Whether this file differs from the recorded baseline values.
    ///
    /// A missing baseline record always counts as changed; otherwise the
    /// file is changed when the mtime delta exceeds [`MTIME_TOLERANCE_SECS`]
    /// or the size differs.
    pub fn changed_since(&self, baseline_mtime: Option<f64>, baseline_size: Option<u64>) -> bool {
        let Some(prev_mtime) = baseline_mtime else {
            return true;
        };
        (self.mtime - prev_mtime).abs() > MTIME_TOLERANCE_SECS || Some(self.size) != baseline_size
    }

    /// Whether two sides agree within the mtime tolerance and have equal size
    pub fn agrees_with(&self, other: &Self) -> bool {
        (self.mtime - other.mtime).abs() <= MTIME_TOLERANCE_SECS && self.size == other.size
    }
}

/// One replica's view of the tree at a single instant: relative path
/// (forward-slash normalized) to file metadata.
///
/// A `BTreeMap` keeps planning deterministic: paths are always visited in
/// sorted order.
pub type Snapshot = BTreeMap<String, FileMeta>;

/// Output of a completed remote command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

/// Minimal stat result for a remote file
#[derive(Debug, Clone, Copy)]
pub struct RemoteStat {
    /// File size in bytes, when the server reported one
    pub size: Option<u64>,
    /// Modification time as epoch seconds, when reported
    pub mtime: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_since_tolerance_window() {
        let meta = FileMeta::new(1_000_400.0, 100);
        // 400s past the baseline exceeds the 180s window.
        assert!(meta.changed_since(Some(1_000_000.0), Some(100)));
        // 100s is within it.
        let near = FileMeta::new(1_000_100.0, 100);
        assert!(!near.changed_since(Some(1_000_000.0), Some(100)));
    }

    #[test]
    fn test_agrees_with() {
        let a = FileMeta::new(1_000_000.0, 500);
        let b = FileMeta::new(1_000_150.0, 500);
        let c = FileMeta::new(1_000_000.0, 600);
        assert!(a.agrees_with(&b));
        assert!(!a.agrees_with(&c));
    }

    #[test]
    fn test_snapshot_sorted_iteration() {
        let mut snapshot = Snapshot::new();
        snapshot.insert("b.txt".to_string(), FileMeta::new(1.0, 1));
        snapshot.insert("a.txt".to_string(), FileMeta::new(1.0, 1));
        let keys: Vec<_> = snapshot.keys().cloned().collect();
        assert_eq!(keys, vec!["a.txt", "b.txt"]);
    }
}
