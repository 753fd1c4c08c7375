//! Remote replica snapshot via a detached enumeration job
//!
//! The server runs `find` with `-printf "%P\t%T@\t%s\n"`, gzips the
//! listing into a temp file, and writes a completion marker. The client
//! launches the job detached, polls for the marker, then downloads and
//! parses the compressed listing. This keeps the SSH channel idle during
//! long enumerations and lets the local walk run at the same time.

use crate::IgnoreSet;
use driftsync_config::SyncConfig;
use driftsync_remote::Transport;
use driftsync_types::{Error, FileMeta, Result, Snapshot};
use flate2::read::GzDecoder;
use std::io::Read;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Sentinel the remote job appends to its marker file when the listing
/// is complete
pub const SCAN_SENTINEL: &str = "SCAN_DONE";

/// Handle for an in-flight remote enumeration job
#[derive(Debug, Clone)]
pub struct ScanJob {
    /// Remote marker file polled for [`SCAN_SENTINEL`]
    pub marker: String,
    /// Remote gzip-compressed TSV listing
    pub output: String,
}

/// Drives the remote enumeration job over a [`Transport`]
pub struct RemoteScanner<'a> {
    transport: &'a dyn Transport,
    config: &'a SyncConfig,
}

impl<'a> RemoteScanner<'a> {
    /// Create a scanner bound to a transport and configuration
    pub fn new(transport: &'a dyn Transport, config: &'a SyncConfig) -> Self {
        Self { transport, config }
    }

    /// Launch the detached enumeration job and return its handle.
    ///
    /// The command nohups itself so it survives the launching channel;
    /// the marker is only written after gzip has flushed the full
    /// listing, so a present marker implies a complete output file.
    pub async fn start(&self, ignore: &IgnoreSet) -> Result<ScanJob> {
        let token = Uuid::new_v4().simple().to_string();
        let tmp = self.config.replica.remote_tmp.trim_end_matches('/');
        let marker = format!("{tmp}/driftsync_scan_{token}.done");
        let output = format!("{tmp}/driftsync_scan_{token}.tsv.gz");
        let root = &self.config.replica.remote_root;
        let prune = ignore.find_prune_expr();

        let command = format!(
            "nohup sh -c 'find \"{root}\" {prune} \
             -type f -printf \"%P\\t%T@\\t%s\\n\" 2>/dev/null \
             | gzip > \"{output}\" && echo {SCAN_SENTINEL} > \"{marker}\"' \
             >/dev/null 2>&1 &"
        );
        debug!("launching remote scan: {command}");
        self.transport.execute_detached(&command).await?;
        info!("remote scan started, marker {marker}");
        Ok(ScanJob { marker, output })
    }

    /// Poll for the completion marker, then download and parse the
    /// listing into a snapshot.
    ///
    /// Individual poll failures are tolerated (the marker may simply not
    /// exist yet); only the overall deadline fails the scan.
    pub async fn wait(&self, job: &ScanJob, ignore: &IgnoreSet) -> Result<Snapshot> {
        let deadline = Instant::now() + self.config.scan.poll_timeout();
        let interval = self.config.scan.poll_interval();

        loop {
            match self.transport.read_text(&job.marker).await {
                Ok(text) if text.trim_end().ends_with(SCAN_SENTINEL) => break,
                Ok(_) => debug!("marker present but incomplete"),
                Err(error) => debug!("marker not ready: {error}"),
            }
            if Instant::now() >= deadline {
                return Err(Error::ScanTimeout {
                    marker: job.marker.clone(),
                    output: job.output.clone(),
                    seconds: self.config.scan.poll_timeout_secs,
                });
            }
            tokio::time::sleep(interval).await;
        }

        let staging = tempfile::NamedTempFile::new()?;
        self.transport
            .download(&job.output, staging.path())
            .await?;

        let mut text = String::new();
        GzDecoder::new(staging.as_file())
            .read_to_string(&mut text)
            .map_err(|error| {
                Error::archive(format!("cannot decompress remote listing: {error}"))
            })?;

        let snapshot = parse_scan_output(&text, ignore);
        info!("remote scan captured {} files", snapshot.len());
        Ok(snapshot)
    }

    /// Remove the marker and output files on the remote, tolerating
    /// failure; orphaned temp files are harmless
    pub async fn cleanup(&self, job: &ScanJob) {
        for path in [&job.marker, &job.output] {
            if let Err(error) = self.transport.remove(path).await {
                warn!("cannot remove remote scan file {path}: {error}");
            }
        }
    }
}

/// Parse the TSV listing (`path\tmtime\tsize` per line) into a snapshot,
/// dropping malformed rows and ignored paths
pub fn parse_scan_output(text: &str, ignore: &IgnoreSet) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line == SCAN_SENTINEL {
            continue;
        }
        let mut fields = line.splitn(3, '\t');
        let (Some(path), Some(mtime), Some(size)) =
            (fields.next(), fields.next(), fields.next())
        else {
            warn!("dropping malformed scan row: {line:?}");
            continue;
        };
        let (Ok(mtime), Ok(size)) = (mtime.parse::<f64>(), size.parse::<u64>()) else {
            warn!("dropping unparsable scan row: {line:?}");
            continue;
        };
        if path.is_empty() || ignore.is_ignored(path) {
            continue;
        }
        snapshot.insert(path.to_string(), FileMeta::new(mtime, size));
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing_rows() {
        let text = "a.txt\t1700000000.123\t42\nsub/b.bin\t1700000100.0\t1024\n";
        let snapshot = parse_scan_output(text, &IgnoreSet::default());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a.txt"].size, 42);
        assert!((snapshot["sub/b.bin"].mtime - 1_700_000_100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_drops_sentinel_and_malformed_rows() {
        let text = "good.txt\t1700000000\t1\nno-tabs-here\nbad\tnot-a-number\t9\nSCAN_DONE\n";
        let snapshot = parse_scan_output(text, &IgnoreSet::default());
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["good.txt"]);
    }

    #[test]
    fn test_parse_applies_ignore_rules() {
        let text = "keep.rs\t1700000000\t1\nbuild/out.o\t1700000000\t2\n";
        let ignore = IgnoreSet::parse("**/build\n");
        let snapshot = parse_scan_output(text, &ignore);
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["keep.rs"]);
    }

    /// Transport whose marker file never materializes
    struct NeverReady;

    #[async_trait::async_trait]
    impl Transport for NeverReady {
        async fn execute(
            &self,
            _command: &str,
            _timeout: std::time::Duration,
        ) -> Result<driftsync_types::CommandOutput> {
            Err(Error::transport("not used"))
        }

        async fn execute_detached(&self, _command: &str) -> Result<()> {
            Ok(())
        }

        async fn upload(&self, _local: &std::path::Path, _remote: &str) -> Result<()> {
            Err(Error::transport("not used"))
        }

        async fn download(&self, _remote: &str, _local: &std::path::Path) -> Result<()> {
            Err(Error::transport("not used"))
        }

        async fn stat(&self, _remote: &str) -> Result<driftsync_types::RemoteStat> {
            Err(Error::transport("not used"))
        }

        async fn exists(&self, _remote: &str) -> Result<bool> {
            Ok(false)
        }

        async fn remove(&self, _remote: &str) -> Result<()> {
            Ok(())
        }

        async fn read_text(&self, _remote: &str) -> Result<String> {
            Err(Error::transport("no such file"))
        }
    }

    #[tokio::test]
    async fn test_wait_deadline_names_orphaned_remote_files() {
        let mut config = SyncConfig::default();
        config.scan.poll_interval_secs = 0;
        config.scan.poll_timeout_secs = 0;
        let transport = NeverReady;
        let scanner = RemoteScanner::new(&transport, &config);
        let job = ScanJob {
            marker: "/tmp/driftsync_scan_ab.done".to_string(),
            output: "/tmp/driftsync_scan_ab.tsv.gz".to_string(),
        };

        let error = scanner
            .wait(&job, &IgnoreSet::default())
            .await
            .expect_err("marker never appears");
        match error {
            Error::ScanTimeout {
                marker,
                output,
                seconds,
            } => {
                assert_eq!(marker, job.marker);
                assert_eq!(output, job.output);
                assert_eq!(seconds, 0);
            }
            other => panic!("expected scan timeout, got {other}"),
        }
    }

    #[test]
    fn test_parse_keeps_tabs_inside_size_field_out() {
        // splitn(3) keeps any extra tab inside the third field, which then
        // fails the numeric parse and drops the row.
        let text = "weird\t1700000000\t5\textra\n";
        let snapshot = parse_scan_output(text, &IgnoreSet::default());
        assert!(snapshot.is_empty());
    }
}
