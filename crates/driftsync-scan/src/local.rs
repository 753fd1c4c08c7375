//! Local replica snapshot via a synchronous directory walk

use crate::IgnoreSet;
use driftsync_config::ReplicaConfig;
use driftsync_types::{Error, FileMeta, Result, Snapshot};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Walk the local replica root and capture a snapshot of every regular
/// file that is neither ignored nor a bookkeeping artifact.
///
/// Paths in the snapshot are relative to the root and use `/` separators
/// on every platform, matching the remote listing format. `.git` trees
/// are pruned without descending; conflict artifacts from earlier runs
/// are never re-synchronized.
pub fn scan_local(replica: &ReplicaConfig, ignore: &IgnoreSet) -> Result<Snapshot> {
    let root = &replica.local_root;
    if !root.is_dir() {
        return Err(Error::config(format!(
            "local root {} is not a directory",
            root.display()
        )));
    }

    let mut snapshot = Snapshot::new();
    let walker = WalkDir::new(root).follow_links(false).into_iter();
    let walker = walker.filter_entry(|entry| {
        !(entry.file_type().is_dir() && entry.file_name() == ".git")
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!("skipping unreadable entry: {error}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = match relative_key(root, entry.path()) {
            Some(rel) => rel,
            None => continue,
        };
        if is_bookkeeping(replica, &rel) || is_conflict_artifact(&rel) {
            continue;
        }
        if ignore.is_ignored(&rel) {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                snapshot.insert(rel, FileMeta::from_fs(&metadata));
            }
            Err(error) => warn!("cannot stat {rel}: {error}"),
        }
    }

    debug!(
        "local scan of {} captured {} files",
        root.display(),
        snapshot.len()
    );
    Ok(snapshot)
}

/// Relative forward-slash key for a path under `root`
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = rel.iter().map(|c| c.to_str().unwrap_or("")).collect();
    if parts.iter().any(|p| p.is_empty()) {
        warn!("skipping non-UTF-8 path under {}", root.display());
        return None;
    }
    Some(parts.join("/"))
}

/// Whether `rel` names one of the bookkeeping files kept at the root
fn is_bookkeeping(replica: &ReplicaConfig, rel: &str) -> bool {
    rel == replica.state_file || rel == replica.progress_file || rel == replica.ignore_file
}

/// Whether `rel` is a conflict side-car or info file from an earlier run
fn is_conflict_artifact(rel: &str) -> bool {
    rel.rsplit('/')
        .next()
        .is_some_and(|name| name.contains(".conflict"))
}
