//! Conflict pre-flight and non-destructive resolution artifacts
//!
//! A conflicted path never transfers. Instead the remote bytes are
//! fetched, hashed against the local file, and, when they genuinely
//! differ, written next to the local file as a side-car copy plus a
//! diagnostic report. Neither the remote side nor the local original is
//! ever modified, and artifacts are never removed automatically.

use crate::confirm::{ConfirmationProvider, PreflightDecision};
use driftsync_config::SyncConfig;
use driftsync_remote::Transport;
use driftsync_types::{Error, Result};
use flate2::read::GzDecoder;
use std::fmt::Write as _;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const PACK_TIMEOUT: Duration = Duration::from_secs(30);

/// What resolving one conflict produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// Dry-run mode; nothing was fetched or written
    DryRun,
    /// Hashes matched; metadata drift only, no artifact written
    ContentIdentical,
    /// Remote copy and diagnostic report written locally
    ArtifactWritten {
        /// Side-car copy holding the remote bytes
        copy: PathBuf,
        /// Diagnostic report
        info: PathBuf,
    },
}

/// Fetches, verifies, and materializes conflicts
pub struct ConflictResolver<'a> {
    transport: &'a dyn Transport,
    config: &'a SyncConfig,
}

/// Find leftover conflict artifacts under `root`, as sorted relative
/// paths
pub fn find_conflict_artifacts(root: &Path) -> Vec<String> {
    let mut found: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.file_name().to_string_lossy().contains(".conflict")
        })
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    found.sort();
    found
}

impl<'a> ConflictResolver<'a> {
    /// Create a resolver bound to a transport and configuration
    pub fn new(transport: &'a dyn Transport, config: &'a SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Pre-flight: refuse to plan while artifacts from a previous run
    /// are still present, unless the operator clears them.
    ///
    /// Returns `true` when the run should proceed.
    pub fn preflight(
        &self,
        dry_run: bool,
        confirmer: &mut dyn ConfirmationProvider,
    ) -> Result<bool> {
        let artifacts = find_conflict_artifacts(&self.config.replica.local_root);
        if artifacts.is_empty() {
            return Ok(true);
        }
        warn!("found {} unresolved conflict artifact(s)", artifacts.len());

        match confirmer.confirm_preflight(&artifacts) {
            PreflightDecision::Abort => {
                info!("exiting, conflict artifacts left untouched");
                Ok(false)
            }
            decision => {
                if dry_run {
                    info!("dry-run: would remove {} artifact(s)", artifacts.len());
                } else {
                    for rel in &artifacts {
                        let path = self.config.replica.local_root.join(rel);
                        if let Err(error) = std::fs::remove_file(&path) {
                            warn!("cannot remove artifact {rel}: {error}");
                        }
                    }
                    info!("removed {} conflict artifact(s)", artifacts.len());
                }
                Ok(decision == PreflightDecision::RemoveAndContinue)
            }
        }
    }

    /// Resolve one conflicted path into an artifact pair, or nothing
    /// when the contents turn out identical
    pub async fn resolve(
        &self,
        rel: &str,
        reason: &str,
        dry_run: bool,
    ) -> Result<ConflictOutcome> {
        if dry_run {
            info!("conflict (dry-run) {rel}: {reason}");
            return Ok(ConflictOutcome::DryRun);
        }

        let remote_bytes = self.fetch_remote_bytes(rel).await?;
        let local_path = self.config.replica.local_root.join(rel);
        let local_hash = blake3::hash(&std::fs::read(&local_path)?);
        let remote_hash = blake3::hash(&remote_bytes);

        if local_hash == remote_hash {
            debug!("conflict on {rel} is metadata drift only, contents identical");
            return Ok(ConflictOutcome::ContentIdentical);
        }

        let timestamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let (copy, info) = artifact_paths(&local_path, &timestamp);
        std::fs::write(&copy, &remote_bytes)?;
        std::fs::write(
            &info,
            self.report(rel, &local_path, &copy, reason, &local_hash, &remote_hash, &timestamp),
        )?;

        info!("conflict {rel}: {reason}");
        info!("  remote copy saved as {}", copy.display());
        Ok(ConflictOutcome::ArtifactWritten { copy, info })
    }

    /// Download one remote file's bytes via a single-file archive
    async fn fetch_remote_bytes(&self, rel: &str) -> Result<Vec<u8>> {
        let remote_tar = format!(
            "{}/driftsync_conflict_{}.tar.gz",
            self.config.replica.remote_tmp.trim_end_matches('/'),
            Uuid::new_v4().simple()
        );
        let result = self.fetch_inner(rel, &remote_tar).await;
        if let Err(error) = self.transport.remove(&remote_tar).await {
            debug!("cannot remove remote temp {remote_tar}: {error}");
        }
        result
    }

    async fn fetch_inner(&self, rel: &str, remote_tar: &str) -> Result<Vec<u8>> {
        let pack = format!(
            "cd '{}' && tar czf '{remote_tar}' --no-recursion '{rel}' 2>&1",
            self.config.replica.remote_root
        );
        self.transport.execute(&pack, PACK_TIMEOUT).await?;

        let staging = NamedTempFile::new()?;
        self.transport.download(remote_tar, staging.path()).await?;

        let mut archive = tar::Archive::new(GzDecoder::new(staging.as_file()));
        let mut entries = archive
            .entries()
            .map_err(|error| Error::archive(format!("unreadable conflict archive: {error}")))?;
        let entry = entries
            .next()
            .ok_or_else(|| Error::archive(format!("conflict archive for {rel} is empty")))?;
        let mut bytes = Vec::new();
        entry
            .map_err(|error| Error::archive(format!("corrupt conflict archive: {error}")))?
            .read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        rel: &str,
        local_path: &Path,
        copy: &Path,
        reason: &str,
        local_hash: &blake3::Hash,
        remote_hash: &blake3::Hash,
        timestamp: &str,
    ) -> String {
        let endpoint = self.config.connection.endpoint();
        let remote_path = self.config.replica.remote_path(rel);
        let copy_name = copy.file_name().map(|n| n.to_string_lossy().into_owned());
        let copy_name = copy_name.unwrap_or_default();
        let mut report = String::new();
        let _ = writeln!(report, "SYNC CONFLICT  {timestamp}");
        let _ = writeln!(report, "{}", "-".repeat(60));
        let _ = writeln!(report, "  File   : {rel}");
        let _ = writeln!(report, "  Local  : {}", local_path.display());
        let _ = writeln!(report, "  Remote : {endpoint}:{remote_path}");
        let _ = writeln!(report, "\nConflict reason:\n  {reason}");
        let _ = writeln!(report, "\nBLAKE3 hashes:");
        let _ = writeln!(report, "  local  : {local_hash}");
        let _ = writeln!(report, "  remote : {remote_hash}");
        let _ = writeln!(report, "\nRemote copy saved as:\n  {copy_name}");
        let _ = writeln!(report, "\nTo resolve:");
        let _ = writeln!(report, "  1. Compare the local file with the remote copy in a diff tool.");
        let _ = writeln!(report, "  2. Merge the changes you want into the local file.");
        let _ = writeln!(report, "  3. Delete the .conflict and .conflict-info files.");
        let _ = writeln!(report, "  4. Run sync again.");
        report
    }
}

/// Side-car names: `<stem>.remote.<ts>.conflict<ext>` and
/// `<stem>.<ts>.conflict-info`, next to the original
fn artifact_paths(local_path: &Path, timestamp: &str) -> (PathBuf, PathBuf) {
    let stem = local_path
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let ext = local_path
        .extension()
        .map_or_else(String::new, |e| format!(".{}", e.to_string_lossy()));
    let copy = local_path.with_file_name(format!("{stem}.remote.{timestamp}.conflict{ext}"));
    let info = local_path.with_file_name(format!("{stem}.{timestamp}.conflict-info"));
    (copy, info)
}
