//! Batched archive transfers, push and pull
//!
//! Each batch moves as a single gzip tar: packed locally and extracted
//! remotely for push, packed remotely from an uploaded manifest and
//! extracted locally for pull. A batch checkpoints all of its paths into
//! the baseline and ledger only after extraction succeeds, then persists
//! both, so a crash loses at most the in-flight batch and never records
//! a transfer that did not complete.

use driftsync_config::SyncConfig;
use driftsync_remote::Transport;
use driftsync_state::{ProgressLedger, SyncState};
use driftsync_types::{Error, FileMeta, Result, Snapshot};
use filetime::FileTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write as _;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

/// Executes push and pull batches over a transport
pub struct BatchTransfer<'a> {
    transport: &'a dyn Transport,
    config: &'a SyncConfig,
}

impl<'a> BatchTransfer<'a> {
    /// Create an executor bound to a transport and configuration
    pub fn new(transport: &'a dyn Transport, config: &'a SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Push one batch: pack locally, upload, extract remotely, then
    /// checkpoint every path in the batch
    pub async fn push_batch(
        &self,
        batch: &[String],
        dry_run: bool,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if dry_run {
            for rel in batch {
                info!("push (dry-run) {rel}");
            }
            return Ok(());
        }

        let remote_tar = format!(
            "{}/driftsync_push_{}.tar.gz",
            self.config.replica.remote_tmp.trim_end_matches('/'),
            Uuid::new_v4().simple()
        );
        let result = self.push_inner(batch, &remote_tar, state, ledger).await;
        self.remove_quiet(&remote_tar).await;
        result
    }

    async fn push_inner(
        &self,
        batch: &[String],
        remote_tar: &str,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
    ) -> Result<()> {
        let root = &self.config.replica.local_root;
        debug!("packing {} file(s)", batch.len());
        let archive = pack_local_archive(root, batch, self.config.transfer.compression_level)?;
        let compressed = archive.as_file().metadata()?.len();
        info!("pushing {} file(s), {} KB", batch.len(), compressed / 1024);

        self.transport.upload(archive.path(), remote_tar).await?;

        let extract = format!(
            "cd '{}' && tar xzf '{remote_tar}' --no-same-owner 2>&1",
            self.config.replica.remote_root
        );
        self.transport
            .execute(&extract, self.config.transfer.command_timeout())
            .await?;

        // Extraction makes the two sides identical, so the local
        // metadata becomes the agreed baseline for both.
        for rel in batch {
            let meta = FileMeta::from_fs(&std::fs::metadata(root.join(rel))?);
            state.record(rel, meta, meta);
            ledger.pushed.insert(rel.clone());
            info!("pushed {rel}");
        }
        ledger.save(&self.config.replica.progress_path())?;
        state.save(&self.config.replica.state_path())?;
        Ok(())
    }

    /// Pull one batch: upload a manifest, pack remotely, download,
    /// extract locally with remote mtimes restored, then checkpoint
    pub async fn pull_batch(
        &self,
        batch: &[String],
        dry_run: bool,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
        remote_snapshot: &Snapshot,
    ) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        if dry_run {
            for rel in batch {
                info!("pull (dry-run) {rel}");
            }
            return Ok(());
        }

        let tmp = self.config.replica.remote_tmp.trim_end_matches('/');
        let token = Uuid::new_v4().simple().to_string();
        let remote_tar = format!("{tmp}/driftsync_pull_{token}.tar.gz");
        let manifest = format!("{tmp}/driftsync_manifest_{token}.txt");

        let result = self
            .pull_inner(batch, &remote_tar, &manifest, state, ledger, remote_snapshot)
            .await;
        self.remove_quiet(&remote_tar).await;
        self.remove_quiet(&manifest).await;
        result
    }

    async fn pull_inner(
        &self,
        batch: &[String],
        remote_tar: &str,
        manifest: &str,
        state: &mut SyncState,
        ledger: &mut ProgressLedger,
        remote_snapshot: &Snapshot,
    ) -> Result<()> {
        // The manifest goes up as a file so the path list never hits
        // command-line length limits.
        let mut manifest_file = NamedTempFile::new()?;
        manifest_file.write_all(batch.join("\n").as_bytes())?;
        manifest_file.flush()?;
        self.transport.upload(manifest_file.path(), manifest).await?;

        info!("pulling {} file(s)", batch.len());
        let pack = format!(
            "cd '{}' && tar czf '{remote_tar}' --no-recursion -T '{manifest}' \
             --ignore-failed-read 2>&1",
            self.config.replica.remote_root
        );
        self.transport
            .execute(&pack, self.config.transfer.command_timeout())
            .await?;

        let staging = NamedTempFile::new()?;
        self.transport.download(remote_tar, staging.path()).await?;
        debug!("downloaded {} KB", staging.as_file().metadata()?.len() / 1024);

        let root = &self.config.replica.local_root;
        extract_local_archive(staging.path(), root, remote_snapshot)?;

        for rel in batch {
            let Ok(metadata) = std::fs::metadata(root.join(rel)) else {
                // The remote side can have lost the file between scan
                // and pack (--ignore-failed-read); skip its checkpoint.
                continue;
            };
            let local = FileMeta::from_fs(&metadata);
            let remote = remote_snapshot.get(rel).copied().unwrap_or(local);
            state.record(rel, local, remote);
            ledger.pulled.insert(rel.clone());
            info!("pulled {rel}");
        }
        ledger.save(&self.config.replica.progress_path())?;
        state.save(&self.config.replica.state_path())?;
        Ok(())
    }

    async fn remove_quiet(&self, remote: &str) {
        if let Err(error) = self.transport.remove(remote).await {
            debug!("cannot remove remote temp {remote}: {error}");
        }
    }
}

/// Pack `batch` (paths relative to `root`) into a gzip tar in a local
/// temp file
pub fn pack_local_archive(
    root: &Path,
    batch: &[String],
    compression_level: u32,
) -> Result<NamedTempFile> {
    let file = NamedTempFile::new()?;
    let encoder = GzEncoder::new(file.reopen()?, Compression::new(compression_level));
    let mut builder = tar::Builder::new(encoder);
    for rel in batch {
        builder
            .append_path_with_name(root.join(rel), rel)
            .map_err(|error| Error::archive(format!("cannot pack {rel}: {error}")))?;
    }
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(|error| Error::archive(format!("cannot finish archive: {error}")))?;
    Ok(file)
}

/// Extract a downloaded gzip tar under `root`, restoring each entry's
/// mtime from the remote snapshot, and return the extracted paths
pub fn extract_local_archive(
    archive: &Path,
    root: &Path,
    remote_snapshot: &Snapshot,
) -> Result<Vec<String>> {
    let file = std::fs::File::open(archive)?;
    let mut reader = tar::Archive::new(GzDecoder::new(file));
    let mut extracted = Vec::new();

    for entry in reader
        .entries()
        .map_err(|error| Error::archive(format!("unreadable archive: {error}")))?
    {
        let mut entry =
            entry.map_err(|error| Error::archive(format!("corrupt archive entry: {error}")))?;
        let rel = entry
            .path()
            .map_err(|error| Error::archive(format!("bad entry path: {error}")))?
            .to_string_lossy()
            .replace('\\', "/");
        // unpack_in rejects entries that would escape the root.
        let unpacked = entry
            .unpack_in(root)
            .map_err(|error| Error::archive(format!("cannot extract {rel}: {error}")))?;
        if !unpacked {
            continue;
        }
        if let Some(meta) = remote_snapshot.get(&rel) {
            let mtime = FileTime::from_unix_time(meta.mtime as i64, 0);
            filetime::set_file_mtime(root.join(&rel), mtime)?;
        }
        extracted.push(rel);
    }
    Ok(extracted)
}
