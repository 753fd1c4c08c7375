//! End-to-end runs against a fake remote
//!
//! The fake transport backs the "remote" replica with a local temp
//! directory and interprets the handful of shell commands the engine
//! issues (tar pack/extract, rm, the detached scan job) using the same
//! archive crates, so whole runs execute without a network.

use async_trait::async_trait;
use driftsync_config::SyncConfig;
use driftsync_engine::{
    ConfirmationProvider, DeletionGroup, GroupDecision, Orchestrator, PreflightDecision,
    RunOptions, SyncMode,
};
use driftsync_remote::Transport;
use driftsync_types::{CommandOutput, Error, RemoteStat, Result};
use filetime::FileTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

struct FakeRemote;

fn single_quoted(command: &str) -> Vec<String> {
    command
        .split('\'')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

fn double_quoted(command: &str) -> Vec<String> {
    command
        .split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

impl FakeRemote {
    fn interpret(command: &str) -> Result<CommandOutput> {
        if command.starts_with("rm -f ") {
            for path in single_quoted(command) {
                let _ = std::fs::remove_file(path);
            }
            return Ok(CommandOutput::default());
        }

        let quoted = single_quoted(command);
        if command.contains("tar xzf") {
            let (root, archive) = (&quoted[0], &quoted[1]);
            let file = std::fs::File::open(archive)
                .map_err(|e| Error::remote_command(command.to_string(), 2, e.to_string()))?;
            tar::Archive::new(GzDecoder::new(file))
                .unpack(root)
                .map_err(|e| Error::remote_command(command.to_string(), 2, e.to_string()))?;
            return Ok(CommandOutput::default());
        }
        if command.contains("tar czf") {
            let root = PathBuf::from(&quoted[0]);
            let archive = &quoted[1];
            let members: Vec<String> = if command.contains("-T ") {
                std::fs::read_to_string(&quoted[2])?
                    .lines()
                    .map(str::to_string)
                    .collect()
            } else {
                vec![quoted[2].clone()]
            };
            let encoder =
                GzEncoder::new(std::fs::File::create(archive)?, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for rel in members {
                let path = root.join(&rel);
                if path.is_file() {
                    builder.append_path_with_name(&path, &rel)?;
                } else if !command.contains("--ignore-failed-read") {
                    return Err(Error::remote_command(
                        command.to_string(),
                        2,
                        format!("{rel}: No such file"),
                    ));
                }
            }
            builder.into_inner().and_then(GzEncoder::finish)?;
            return Ok(CommandOutput::default());
        }
        Err(Error::remote_command(
            command.to_string(),
            127,
            "unhandled fake command".to_string(),
        ))
    }

    fn run_scan(command: &str) -> Result<()> {
        let quoted = double_quoted(command);
        let root = PathBuf::from(&quoted[0]);
        let output = &quoted[quoted.len() - 2];
        let marker = &quoted[quoted.len() - 1];

        let mut listing = String::new();
        let walker = WalkDir::new(&root)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == ".git"));
        for entry in walker.filter_map(std::result::Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            let metadata = entry.metadata().unwrap();
            let mtime = metadata
                .modified()
                .unwrap()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs_f64();
            let _ = writeln!(listing, "{rel}\t{mtime}\t{}", metadata.len());
        }

        let mut encoder =
            GzEncoder::new(std::fs::File::create(output)?, Compression::default());
        encoder.write_all(listing.as_bytes())?;
        encoder.finish()?;
        std::fs::write(marker, "SCAN_DONE\n")?;
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeRemote {
    async fn execute(&self, command: &str, _timeout: Duration) -> Result<CommandOutput> {
        Self::interpret(command)
    }

    async fn execute_detached(&self, command: &str) -> Result<()> {
        Self::run_scan(command)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        std::fs::copy(local, remote)?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        std::fs::copy(remote, local)?;
        Ok(())
    }

    async fn stat(&self, remote: &str) -> Result<RemoteStat> {
        let metadata = std::fs::metadata(remote)?;
        Ok(RemoteStat {
            size: Some(metadata.len()),
            mtime: None,
        })
    }

    async fn exists(&self, remote: &str) -> Result<bool> {
        Ok(Path::new(remote).exists())
    }

    async fn remove(&self, remote: &str) -> Result<()> {
        std::fs::remove_file(remote)?;
        Ok(())
    }

    async fn read_text(&self, remote: &str) -> Result<String> {
        Ok(std::fs::read_to_string(remote)?)
    }
}

struct AcceptEverything;

impl ConfirmationProvider for AcceptEverything {
    fn confirm_deletions(&mut self, _group: &DeletionGroup) -> GroupDecision {
        GroupDecision::ConfirmAll
    }

    fn confirm_preflight(&mut self, _artifacts: &[String]) -> PreflightDecision {
        PreflightDecision::RemoveAndContinue
    }
}

struct Harness {
    _local: TempDir,
    _remote: TempDir,
    _tmp: TempDir,
    config: SyncConfig,
}

impl Harness {
    fn new() -> Self {
        let local = TempDir::new().unwrap();
        let remote = TempDir::new().unwrap();
        let tmp = TempDir::new().unwrap();
        let mut config = SyncConfig::default();
        config.connection.host = "fake.example".to_string();
        config.connection.user = "tester".to_string();
        config.replica.local_root = local.path().to_path_buf();
        config.replica.remote_root = remote.path().to_string_lossy().into_owned();
        config.replica.remote_tmp = tmp.path().to_string_lossy().into_owned();
        config.scan.poll_interval_secs = 0;
        config.scan.poll_timeout_secs = 5;
        Self {
            _local: local,
            _remote: remote,
            _tmp: tmp,
            config,
        }
    }

    fn local(&self, rel: &str) -> PathBuf {
        self.config.replica.local_root.join(rel)
    }

    fn remote(&self, rel: &str) -> PathBuf {
        PathBuf::from(self.config.replica.remote_path(rel))
    }

    async fn run(&self, options: RunOptions) -> driftsync_engine::RunSummary {
        let orchestrator = Orchestrator::new(&FakeRemote, &self.config);
        orchestrator
            .run(options, &mut AcceptEverything)
            .await
            .unwrap()
    }
}

fn age(path: &Path, seconds_back: i64) -> f64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let target = now - seconds_back;
    filetime::set_file_mtime(path, FileTime::from_unix_time(target, 0)).unwrap();
    target as f64
}

#[tokio::test]
async fn test_push_new_file_converges() {
    let harness = Harness::new();
    std::fs::create_dir_all(harness.local("sub")).unwrap();
    std::fs::write(harness.local("a.txt"), b"alpha").unwrap();
    std::fs::write(harness.local("sub/b.txt"), b"beta").unwrap();

    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.pushed, 2);
    assert_eq!(std::fs::read(harness.remote("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(harness.remote("sub/b.txt")).unwrap(), b"beta");
    assert!(harness.config.replica.state_path().exists());
    assert!(!harness.config.replica.progress_path().exists());

    // Immediately re-running finds nothing to do.
    let second = harness.run(RunOptions::default()).await;
    assert_eq!(second.pushed, 0);
    assert_eq!(second.pulled, 0);
    assert_eq!(second.conflicts, 0);
}

#[tokio::test]
async fn test_pull_restores_remote_mtime() {
    let harness = Harness::new();
    std::fs::write(harness.remote("doc.md"), b"# notes").unwrap();
    let remote_mtime = age(&harness.remote("doc.md"), 3600);

    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.pulled, 1);
    assert_eq!(std::fs::read(harness.local("doc.md")).unwrap(), b"# notes");

    let local_mtime = FileTime::from_last_modification_time(
        &std::fs::metadata(harness.local("doc.md")).unwrap(),
    );
    assert_eq!(local_mtime.unix_seconds() as f64, remote_mtime);
}

#[tokio::test]
async fn test_local_deletion_propagates_to_remote() {
    let harness = Harness::new();
    std::fs::write(harness.local("old.txt"), b"x").unwrap();
    harness.run(RunOptions::default()).await;
    assert!(harness.remote("old.txt").exists());

    std::fs::remove_file(harness.local("old.txt")).unwrap();
    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.deleted_remote, 1);
    assert!(!harness.remote("old.txt").exists());
}

#[tokio::test]
async fn test_genuine_conflict_writes_artifacts_without_touching_either_side() {
    let harness = Harness::new();
    std::fs::write(harness.local("doc.txt"), b"base").unwrap();
    harness.run(RunOptions::default()).await;

    std::fs::write(harness.local("doc.txt"), b"local edit").unwrap();
    age(&harness.local("doc.txt"), 1000);
    std::fs::write(harness.remote("doc.txt"), b"remote edit, longer").unwrap();
    age(&harness.remote("doc.txt"), 2000);

    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.conflicts, 1);
    assert_eq!(std::fs::read(harness.local("doc.txt")).unwrap(), b"local edit");
    assert_eq!(
        std::fs::read(harness.remote("doc.txt")).unwrap(),
        b"remote edit, longer"
    );

    let artifacts: Vec<String> = std::fs::read_dir(&harness.config.replica.local_root)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.file_name().to_string_lossy().into_owned()))
        .filter(|name| name.contains(".conflict"))
        .collect();
    assert_eq!(artifacts.len(), 2);
    let copy = artifacts.iter().find(|n| n.ends_with(".txt")).unwrap();
    assert_eq!(
        std::fs::read(harness.local(copy)).unwrap(),
        b"remote edit, longer"
    );
}

#[tokio::test]
async fn test_metadata_only_conflict_is_suppressed_by_hashing() {
    let harness = Harness::new();
    std::fs::write(harness.local("same.txt"), b"same bytes").unwrap();
    harness.run(RunOptions::default()).await;

    // Both mtimes drift past the tolerance, in different directions,
    // with identical content.
    age(&harness.local("same.txt"), 400);
    age(&harness.remote("same.txt"), 1200);

    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.conflicts, 1);
    let any_artifact = std::fs::read_dir(&harness.config.replica.local_root)
        .unwrap()
        .filter_map(std::result::Result::ok)
        .any(|e| e.file_name().to_string_lossy().contains(".conflict"));
    assert!(!any_artifact);
}

#[tokio::test]
async fn test_dry_run_mutates_nothing() {
    let harness = Harness::new();
    std::fs::write(harness.local("new.txt"), b"n").unwrap();

    let summary = harness
        .run(RunOptions {
            dry_run: true,
            ..Default::default()
        })
        .await;
    assert_eq!(summary.pushed, 1);
    assert!(!harness.remote("new.txt").exists());
    assert!(!harness.config.replica.state_path().exists());
    assert!(!harness.config.replica.progress_path().exists());
}

#[tokio::test]
async fn test_pull_only_suppresses_pushes() {
    let harness = Harness::new();
    std::fs::write(harness.local("ours.txt"), b"o").unwrap();
    std::fs::write(harness.remote("theirs.txt"), b"t").unwrap();

    let summary = harness
        .run(RunOptions {
            mode: SyncMode::PullOnly,
            ..Default::default()
        })
        .await;
    assert_eq!(summary.pushed, 0);
    assert_eq!(summary.pulled, 1);
    assert!(!harness.remote("ours.txt").exists());
    assert!(harness.local("theirs.txt").exists());
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_repeating_work() {
    let harness = Harness::new();
    std::fs::write(harness.local("done.txt"), b"already over there").unwrap();
    std::fs::write(harness.local("todo.txt"), b"still pending").unwrap();
    // Simulate a crash after done.txt's batch committed: the file is on
    // the remote and in the ledger, but the run never finished.
    std::fs::write(harness.remote("done.txt"), b"already over there").unwrap();
    std::fs::write(
        harness.config.replica.progress_path(),
        r#"{"pushed": ["done.txt"]}"#,
    )
    .unwrap();

    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.pushed, 1);
    assert!(harness.remote("todo.txt").exists());
    // Clean finish clears the ledger.
    assert!(!harness.config.replica.progress_path().exists());
}

#[tokio::test]
async fn test_ignore_rules_apply_to_both_sides() {
    let harness = Harness::new();
    std::fs::write(harness.local(".stignore"), "*.log\n").unwrap();
    std::fs::write(harness.local("keep.txt"), b"k").unwrap();
    std::fs::write(harness.local("noise.log"), b"n").unwrap();
    std::fs::write(harness.remote("remote-noise.log"), b"rn").unwrap();

    let summary = harness.run(RunOptions::default()).await;
    assert_eq!(summary.pushed, 1);
    assert_eq!(summary.pulled, 0);
    assert!(!harness.remote("noise.log").exists());
    assert!(!harness.local("remote-noise.log").exists());
}
