//! Transport trait for remote command execution and file transfer

use driftsync_types::{CommandOutput, RemoteStat, Result};
use std::path::Path;
use std::time::Duration;

/// Remote session boundary used by every executor.
///
/// All methods are retried internally by the implementation except
/// [`execute_detached`](Transport::execute_detached), which is
/// fire-and-forget by contract.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Run a command and wait for completion.
    ///
    /// Returns the captured output; a non-zero exit status surfaces as
    /// [`Error::RemoteCommand`](driftsync_types::Error::RemoteCommand).
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Launch a command without waiting for its exit status.
    ///
    /// Used only for the asynchronous remote scan; the command must
    /// detach itself (nohup) so it survives a dropped channel.
    async fn execute_detached(&self, command: &str) -> Result<()>;

    /// Upload a local file to a remote path
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Download a remote file to a local path
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;

    /// Stat a remote file
    async fn stat(&self, remote: &str) -> Result<RemoteStat>;

    /// Whether a remote path exists
    async fn exists(&self, remote: &str) -> Result<bool>;

    /// Remove a remote file
    async fn remove(&self, remote: &str) -> Result<()>;

    /// Read a remote text file into a string
    async fn read_text(&self, remote: &str) -> Result<String>;
}
