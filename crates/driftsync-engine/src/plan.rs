//! Reconciliation: two snapshots plus the baseline become a plan
//!
//! Pure logic, no I/O. The only mutation is same-value race adoption,
//! which records a fresh baseline for paths that already agree on both
//! sides without any transfer.

use driftsync_state::{ProgressLedger, SyncState};
use driftsync_types::{Snapshot, MTIME_TOLERANCE_SECS};
use std::collections::BTreeSet;
use tracing::debug;

/// Transfer direction restriction for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Transfer in both directions
    #[default]
    Bidirectional,
    /// Only modify the remote replica
    PushOnly,
    /// Only modify the local replica
    PullOnly,
}

/// One conflicted path with a human-readable diagnosis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Relative path of the conflicted file
    pub rel: String,
    /// Which side changed, by how much
    pub reason: String,
}

/// Output of reconciliation: five disjoint path lists.
///
/// Never persisted; recomputed every run from current snapshots,
/// baseline, and ledger.
#[derive(Debug, Default, Clone)]
pub struct SyncPlan {
    /// Paths to transfer local to remote
    pub to_push: Vec<String>,
    /// Paths to transfer remote to local
    pub to_pull: Vec<String>,
    /// Paths to remove on the remote
    pub to_delete_remote: Vec<String>,
    /// Paths to remove locally
    pub to_delete_local: Vec<String>,
    /// Paths changed on both sides needing human resolution
    pub conflicts: Vec<Conflict>,
}

impl SyncPlan {
    /// Total number of planned actions
    pub fn total(&self) -> usize {
        self.to_push.len()
            + self.to_pull.len()
            + self.to_delete_remote.len()
            + self.to_delete_local.len()
            + self.conflicts.len()
    }

    /// Whether the plan contains no action
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Drop version-control metadata from both deletion lists.
    ///
    /// Scans can race a checkout and surface `.git` entries; deleting
    /// them would corrupt the repository, so they are never acted on.
    pub fn strip_vcs_deletions(&mut self) {
        let keep = |rel: &String| !rel.contains("/.git/") && !rel.ends_with("/.git");
        self.to_delete_remote.retain(keep);
        self.to_delete_local.retain(keep);
    }
}

/// Compute the plan for one run.
///
/// Every path in the union of both snapshots is classified once, in
/// sorted order. Paths already pushed or pulled this run (per the
/// ledger) are skipped outright. Same-value races are adopted into
/// `state` as the new baseline with no transfer.
pub fn reconcile(
    local: &Snapshot,
    remote: &Snapshot,
    state: &mut SyncState,
    ledger: &ProgressLedger,
    mode: SyncMode,
) -> SyncPlan {
    let push_only = mode == SyncMode::PushOnly;
    let pull_only = mode == SyncMode::PullOnly;
    let mut plan = SyncPlan::default();

    let all_paths: BTreeSet<&str> = local.keys().chain(remote.keys()).map(String::as_str).collect();

    for rel in all_paths {
        if ledger.was_pushed(rel) || ledger.was_pulled(rel) {
            debug!("resume-skip {rel}");
            continue;
        }

        let l_meta = local.get(rel);
        let r_meta = remote.get(rel);
        let prev = state.get(rel).copied();

        match (l_meta, r_meta) {
            // Local only: a remote baseline record means the remote side
            // deleted it after the last sync.
            (Some(_), None) => {
                if prev.is_some() && !ledger.was_deleted_local(rel) {
                    if !pull_only {
                        plan.to_delete_local.push(rel.to_string());
                    }
                } else if !pull_only && !ledger.was_pushed(rel) {
                    plan.to_push.push(rel.to_string());
                }
            }
            // Remote only: symmetric.
            (None, Some(_)) => {
                if prev.is_some() && !ledger.was_deleted_remote(rel) {
                    if !push_only {
                        plan.to_delete_remote.push(rel.to_string());
                    }
                } else if !push_only && !ledger.was_pulled(rel) {
                    plan.to_pull.push(rel.to_string());
                }
            }
            (Some(l), Some(r)) => {
                let l_changed = l.changed_since(
                    prev.map(|p| p.local_mtime),
                    prev.map(|p| p.local_size),
                );
                let r_changed = r.changed_since(
                    prev.map(|p| p.remote_mtime),
                    prev.map(|p| p.remote_size),
                );

                if !l_changed && !r_changed {
                    debug!("unchanged {rel}");
                } else if l_changed && r_changed {
                    if l.agrees_with(r) {
                        // Same-value race: both sides already hold the
                        // same file (typical on a first run over
                        // pre-matched trees). Adopt, no transfer.
                        debug!("race-adopt {rel}");
                        state.record(rel, *l, *r);
                    } else {
                        plan.conflicts.push(Conflict {
                            rel: rel.to_string(),
                            reason: conflict_reason(prev.as_ref(), *l, *r),
                        });
                    }
                } else if l_changed && !pull_only {
                    plan.to_push.push(rel.to_string());
                } else if r_changed && !push_only {
                    plan.to_pull.push(rel.to_string());
                }
            }
            (None, None) => unreachable!("path came from the union of the snapshots"),
        }
    }

    plan
}

/// Describe which side changed and by how much, for the conflict report
fn conflict_reason(
    prev: Option<&driftsync_state::StateRecord>,
    local: driftsync_types::FileMeta,
    remote: driftsync_types::FileMeta,
) -> String {
    let Some(prev) = prev else {
        return "file was never synced before (first-run conflict)".to_string();
    };

    let mut parts = Vec::new();
    let l_delta = (local.mtime - prev.local_mtime).abs();
    if l_delta > MTIME_TOLERANCE_SECS || local.size != prev.local_size {
        parts.push(format!(
            "local changed (mtime delta={l_delta:.0}s, size {} to {})",
            prev.local_size, local.size
        ));
    }
    let r_delta = (remote.mtime - prev.remote_mtime).abs();
    if r_delta > MTIME_TOLERANCE_SECS || remote.size != prev.remote_size {
        parts.push(format!(
            "remote changed (mtime delta={r_delta:.0}s, size {} to {})",
            prev.remote_size, remote.size
        ));
    }

    if parts.is_empty() {
        "both sides changed since last sync".to_string()
    } else {
        parts.join("; ")
    }
}
