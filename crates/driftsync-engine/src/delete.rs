//! Confirmed, batched deletions on either replica
//!
//! Pending deletions are grouped by parent directory and each group is
//! put to the confirmation provider. Remote removals go out as one
//! batched command, falling back to per-path removal so partial
//! progress still lands in the ledger if the batch command fails.

use crate::confirm::{ConfirmationProvider, DeletionGroup, DeletionSide, GroupDecision};
use driftsync_config::SyncConfig;
use driftsync_remote::Transport;
use driftsync_state::{ProgressLedger, SyncState};
use driftsync_types::Result;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

const DELETE_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes the deletion phase of a plan
pub struct DeletionHandler<'a> {
    transport: &'a dyn Transport,
    config: &'a SyncConfig,
}

/// Group sorted paths by their POSIX parent directory, `.` for the root
pub fn group_by_parent(paths: &[String], side: DeletionSide) -> Vec<DeletionGroup> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut sorted: Vec<&String> = paths.iter().collect();
    sorted.sort();
    for rel in sorted {
        let parent = match rel.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => ".".to_string(),
        };
        groups.entry(parent).or_default().push(rel.clone());
    }
    groups
        .into_iter()
        .map(|(parent, paths)| DeletionGroup {
            parent,
            paths,
            side,
        })
        .collect()
}

/// Run every group past the provider; `None` means the operator aborted
/// the whole phase
fn confirm_groups(
    paths: &[String],
    side: DeletionSide,
    confirmer: &mut dyn ConfirmationProvider,
) -> Option<Vec<String>> {
    let mut confirmed = Vec::new();
    let mut accept_all = false;
    for group in group_by_parent(paths, side) {
        if accept_all {
            confirmed.extend(group.paths);
            continue;
        }
        match confirmer.confirm_deletions(&group) {
            GroupDecision::Confirm => confirmed.extend(group.paths),
            GroupDecision::Skip => {}
            GroupDecision::ConfirmAll => {
                confirmed.extend(group.paths);
                accept_all = true;
            }
            GroupDecision::Abort => {
                info!("{side} deletion phase aborted by operator");
                return None;
            }
        }
    }
    Some(confirmed)
}

impl<'a> DeletionHandler<'a> {
    /// Create a handler bound to a transport and configuration
    pub fn new(transport: &'a dyn Transport, config: &'a SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Remove confirmed paths on the remote replica
    pub async fn delete_remote(
        &self,
        paths: &[String],
        dry_run: bool,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
        confirmer: &mut dyn ConfirmationProvider,
    ) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        if dry_run {
            for rel in paths {
                info!("delete remote (dry-run) {rel}");
            }
            return Ok(());
        }
        let Some(confirmed) = confirm_groups(paths, DeletionSide::Remote, confirmer) else {
            return Ok(());
        };
        if confirmed.is_empty() {
            info!("no remote deletions confirmed");
            return Ok(());
        }

        let quoted: Vec<String> = confirmed
            .iter()
            .map(|rel| format!("'{}'", self.config.replica.remote_path(rel)))
            .collect();
        let command = format!("rm -f {}", quoted.join(" "));

        match self.transport.execute(&command, DELETE_TIMEOUT).await {
            Ok(_) => {
                for rel in &confirmed {
                    state.forget(rel);
                    ledger.deleted_remote.insert(rel.clone());
                    info!("deleted remote {rel}");
                }
            }
            Err(error) => {
                warn!("batched remote delete failed ({error}), retrying one by one");
                for rel in &confirmed {
                    match self
                        .transport
                        .remove(&self.config.replica.remote_path(rel))
                        .await
                    {
                        Ok(()) => {
                            state.forget(rel);
                            ledger.deleted_remote.insert(rel.clone());
                            info!("deleted remote {rel}");
                        }
                        Err(error) => warn!("cannot delete remote {rel}: {error}"),
                    }
                }
            }
        }

        ledger.save(&self.config.replica.progress_path())?;
        state.save(&self.config.replica.state_path())?;
        Ok(())
    }

    /// Remove confirmed paths on the local replica
    pub fn delete_local(
        &self,
        paths: &[String],
        dry_run: bool,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
        confirmer: &mut dyn ConfirmationProvider,
    ) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        if dry_run {
            for rel in paths {
                info!("delete local (dry-run) {rel}");
            }
            return Ok(());
        }
        let Some(confirmed) = confirm_groups(paths, DeletionSide::Local, confirmer) else {
            return Ok(());
        };
        if confirmed.is_empty() {
            info!("no local deletions confirmed");
            return Ok(());
        }

        for rel in &confirmed {
            let path = self.config.replica.local_root.join(rel);
            match std::fs::remove_file(&path) {
                // Already gone counts as deleted.
                Ok(()) | Err(_) if !path.exists() => {
                    state.forget(rel);
                    ledger.deleted_local.insert(rel.clone());
                    info!("deleted local {rel}");
                }
                Ok(()) | Err(_) => warn!("cannot delete local {rel}"),
            }
        }

        ledger.save(&self.config.replica.progress_path())?;
        state.save(&self.config.replica.state_path())?;
        Ok(())
    }
}
