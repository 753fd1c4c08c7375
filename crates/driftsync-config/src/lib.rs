//! Configuration management for driftsync
//!
//! A single immutable [`SyncConfig`] value is constructed once (from a YAML
//! profile or defaults) and passed into every component constructor. There
//! is no global mutable configuration.
//!
//! # Examples
//!
//! ```rust
//! use driftsync_config::SyncConfig;
//!
//! let config = SyncConfig::default();
//! assert_eq!(config.transfer.max_batch_files, 100);
//! assert_eq!(config.retry.max_attempts, 5);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod profile;

pub use profile::load_profile;

/// Main configuration structure for driftsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote session configuration
    pub connection: ConnectionConfig,
    /// Replica root paths and bookkeeping file names
    pub replica: ReplicaConfig,
    /// Retry policy for remote primitives
    pub retry: RetryConfig,
    /// Remote enumeration polling configuration
    pub scan: ScanConfig,
    /// Batch transfer configuration
    pub transfer: TransferConfig,
}

/// Remote session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Remote host name or address
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Remote user name
    pub user: String,
    /// Private key path; `None` uses the SSH agent
    pub key_path: Option<PathBuf>,
    /// Password, only for password authentication
    pub password: Option<String>,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Keep-alive heartbeat interval in seconds
    pub keep_alive_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            user: String::new(),
            key_path: None,
            password: None,
            connect_timeout_secs: 20,
            keep_alive_secs: 30,
        }
    }
}

impl ConnectionConfig {
    /// TCP connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Keep-alive heartbeat interval
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Human-readable endpoint description, e.g. `user@host:22`
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Replica root paths and the names of the bookkeeping files kept at the
/// local root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Local replica root directory
    pub local_root: PathBuf,
    /// Remote replica root (POSIX path)
    pub remote_root: String,
    /// Remote directory for scan output and batch archives
    pub remote_tmp: String,
    /// Ignore rules file name at the local root
    pub ignore_file: String,
    /// Persisted baseline table file name
    pub state_file: String,
    /// Per-run progress ledger file name
    pub progress_file: String,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            local_root: PathBuf::new(),
            remote_root: String::new(),
            remote_tmp: "/tmp".to_string(),
            ignore_file: ".stignore".to_string(),
            state_file: ".sync_state.tsv".to_string(),
            progress_file: ".sync_progress.json".to_string(),
        }
    }
}

impl ReplicaConfig {
    /// Absolute path of the persisted baseline table
    pub fn state_path(&self) -> PathBuf {
        self.local_root.join(&self.state_file)
    }

    /// Absolute path of the progress ledger
    pub fn progress_path(&self) -> PathBuf {
        self.local_root.join(&self.progress_file)
    }

    /// Absolute path of the ignore rules file
    pub fn ignore_path(&self) -> PathBuf {
        self.local_root.join(&self.ignore_file)
    }

    /// Remote absolute path for a relative path
    pub fn remote_path(&self, rel: &str) -> String {
        format!("{}/{}", self.remote_root.trim_end_matches('/'), rel)
    }
}

/// Retry policy settings for retryable remote primitives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts before the failure is surfaced
    pub max_attempts: u32,
    /// Initial backoff delay in seconds; doubles each attempt
    pub base_delay_secs: u64,
    /// Backoff ceiling in seconds
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 2,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    /// Initial backoff delay
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }

    /// Backoff ceiling
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

/// Remote enumeration polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Seconds between marker polls
    pub poll_interval_secs: u64,
    /// Maximum seconds to wait for the remote enumeration job
    pub poll_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            poll_timeout_secs: 120,
        }
    }
}

impl ScanConfig {
    /// Interval between marker polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Overall polling deadline
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

/// Batch transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Hard cap on files per archive batch
    pub max_batch_files: usize,
    /// Optional cap on estimated compressed bytes per batch
    pub batch_byte_budget: Option<u64>,
    /// Gzip compression level for push archives (0-9)
    pub compression_level: u32,
    /// Timeout in seconds for remote pack/extract commands
    pub command_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_batch_files: 100,
            batch_byte_budget: None,
            compression_level: 6,
            command_timeout_secs: 120,
        }
    }
}

impl TransferConfig {
    /// Timeout for remote pack/extract commands
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
