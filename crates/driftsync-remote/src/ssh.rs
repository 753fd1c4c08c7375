//! ssh2-backed transport with reconnect, keep-alive, and retry

use crate::retry::RetryPolicy;
use crate::transport::Transport;
use driftsync_config::ConnectionConfig;
use driftsync_types::{CommandOutput, Error, RemoteStat, Result};
use futures::FutureExt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Map an ssh2 failure onto the transport error class
fn transport_err(error: &ssh2::Error) -> Error {
    Error::transport(error.to_string())
}

/// Blocking SSH session state. Lives behind a mutex and is only touched
/// from `spawn_blocking` closures.
struct SshSession {
    config: ConnectionConfig,
    session: Option<ssh2::Session>,
}

impl SshSession {
    fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Idempotent connect: probes liveness first and reconnects only when
    /// the probe fails.
    fn ensure_connected(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            if session.keepalive_send().is_ok() {
                return Ok(());
            }
            warn!("SSH liveness probe failed, reconnecting");
            self.session = None;
        }
        self.connect()
    }

    fn connect(&mut self) -> Result<()> {
        let endpoint = self.config.endpoint();
        info!("connecting to {endpoint}");

        let addr = format!("{}:{}", self.config.host, self.config.port)
            .to_socket_addrs()
            .map_err(|e| Error::transport(format!("cannot resolve {endpoint}: {e}")))?
            .next()
            .ok_or_else(|| Error::transport(format!("no address for {endpoint}")))?;

        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout())
            .map_err(|e| Error::transport(format!("cannot reach {endpoint}: {e}")))?;

        let mut session = ssh2::Session::new().map_err(|e| transport_err(&e))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.config.connect_timeout().as_millis() as u32);
        session.handshake().map_err(|e| transport_err(&e))?;

        if let Some(key_path) = &self.config.key_path {
            session
                .userauth_pubkey_file(&self.config.user, None, key_path, None)
                .map_err(|e| transport_err(&e))?;
        } else if let Some(password) = &self.config.password {
            session
                .userauth_password(&self.config.user, password)
                .map_err(|e| transport_err(&e))?;
        } else {
            session
                .userauth_agent(&self.config.user)
                .map_err(|e| transport_err(&e))?;
        }

        if !session.authenticated() {
            return Err(Error::transport(format!(
                "authentication failed for {endpoint}"
            )));
        }

        // libssh2 tracks when a heartbeat is due; the background task
        // drives the actual sends.
        session.set_keepalive(true, self.config.keep_alive_secs as u32);

        info!("connected to {endpoint}");
        self.session = Some(session);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "closing", None);
            debug!("disconnected");
        }
    }

    fn session(&self) -> Result<&ssh2::Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::transport("not connected"))
    }

    fn heartbeat(&self) {
        if let Some(session) = &self.session {
            let _ = session.keepalive_send();
        }
    }

    fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let session = self.session()?;
        session.set_timeout(timeout.as_millis() as u32);
        let result = self.exec_on(session, command);
        session.set_timeout(self.config.connect_timeout().as_millis() as u32);
        result
    }

    fn exec_on(&self, session: &ssh2::Session, command: &str) -> Result<CommandOutput> {
        let mut channel = session.channel_session().map_err(|e| transport_err(&e))?;
        channel.exec(command).map_err(|e| transport_err(&e))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| Error::transport(format!("reading command output: {e}")))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| Error::transport(format!("reading command stderr: {e}")))?;

        channel.wait_close().map_err(|e| transport_err(&e))?;
        let status = channel.exit_status().map_err(|e| transport_err(&e))?;
        if status != 0 {
            return Err(Error::remote_command(command.to_string(), status, stderr));
        }
        Ok(CommandOutput { stdout, stderr })
    }

    fn exec_detached(&self, command: &str) -> Result<()> {
        let session = self.session()?;
        let mut channel = session.channel_session().map_err(|e| transport_err(&e))?;
        channel.exec(command).map_err(|e| transport_err(&e))?;
        // Deliberately no exit-status wait: the command detaches itself.
        Ok(())
    }

    fn sftp(&self) -> Result<ssh2::Sftp> {
        self.session()?.sftp().map_err(|e| transport_err(&e))
    }

    fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let mut src = std::fs::File::open(local)
            .map_err(|e| Error::Io {
                message: format!("cannot open '{}': {}", local.display(), e),
            })?;
        let mut dst = self
            .sftp()?
            .create(Path::new(remote))
            .map_err(|e| transport_err(&e))?;
        std::io::copy(&mut src, &mut dst)
            .map_err(|e| Error::transport(format!("upload to '{remote}' failed: {e}")))?;
        Ok(())
    }

    fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let mut src = self
            .sftp()?
            .open(Path::new(remote))
            .map_err(|e| transport_err(&e))?;
        let mut dst = std::fs::File::create(local).map_err(|e| Error::Io {
            message: format!("cannot create '{}': {}", local.display(), e),
        })?;
        std::io::copy(&mut src, &mut dst)
            .map_err(|e| Error::transport(format!("download of '{remote}' failed: {e}")))?;
        dst.flush().map_err(Error::from)?;
        Ok(())
    }

    fn stat(&self, remote: &str) -> Result<RemoteStat> {
        let stat = self
            .sftp()?
            .stat(Path::new(remote))
            .map_err(|e| transport_err(&e))?;
        Ok(RemoteStat {
            size: stat.size,
            mtime: stat.mtime,
        })
    }

    fn exists(&self, remote: &str) -> Result<bool> {
        match self.sftp()?.stat(Path::new(remote)) {
            Ok(_) => Ok(true),
            // LIBSSH2_FX_NO_SUCH_FILE
            Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => Ok(false),
            Err(e) => Err(transport_err(&e)),
        }
    }

    fn remove(&self, remote: &str) -> Result<()> {
        self.sftp()?
            .unlink(Path::new(remote))
            .map_err(|e| transport_err(&e))
    }

    fn read_text(&self, remote: &str) -> Result<String> {
        let mut file = self
            .sftp()?
            .open(Path::new(remote))
            .map_err(|e| transport_err(&e))?;
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| Error::transport(format!("reading '{remote}': {e}")))?;
        Ok(text)
    }
}

/// SSH transport: owns the remote session, reconnects on drop, sends
/// keep-alive heartbeats, and retries every primitive except the
/// fire-and-forget launch.
pub struct SshTransport {
    inner: Arc<Mutex<SshSession>>,
    retry: RetryPolicy,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    keepalive_interval: Duration,
}

impl SshTransport {
    /// Create a transport for the given endpoint. No connection is made
    /// until [`connect`](Self::connect) or the first remote operation.
    pub fn new(config: ConnectionConfig, retry: RetryPolicy) -> Self {
        let keepalive_interval = config.keep_alive_interval();
        Self {
            inner: Arc::new(Mutex::new(SshSession::new(config))),
            retry,
            keepalive: Mutex::new(None),
            keepalive_interval,
        }
    }

    /// Establish the session and start the keep-alive heartbeat.
    /// Idempotent: an already-live session is left untouched.
    pub async fn connect(&self) -> Result<()> {
        self.blocking(|_| Ok(())).await?;
        self.start_keepalive();
        Ok(())
    }

    /// Tear down the heartbeat and close the session
    pub async fn disconnect(&self) {
        if let Some(handle) = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        let _ = tokio::task::spawn_blocking(move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .disconnect();
        })
        .await;
    }

    fn start_keepalive(&self) {
        let mut slot = self
            .keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let interval = self.keepalive_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let inner = Arc::clone(&inner);
                let _ = tokio::task::spawn_blocking(move || {
                    inner
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .heartbeat();
                })
                .await;
            }
        }));
    }

    /// Run one blocking session operation on the blocking pool, ensuring
    /// the session is live first
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut SshSession) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.ensure_connected()?;
            op(&mut guard)
        })
        .await
        .map_err(|e| Error::other(format!("transport worker failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl Transport for SshTransport {
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        let command = command.to_string();
        self.retry
            .run("remote command", || {
                let command = command.clone();
                async move { self.blocking(move |s| s.exec(&command, timeout)).await }.boxed()
            })
            .await
    }

    async fn execute_detached(&self, command: &str) -> Result<()> {
        // Fire-and-forget: exactly one attempt, by contract.
        let command = command.to_string();
        self.blocking(move |s| s.exec_detached(&command)).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        self.retry
            .run("sftp upload", || {
                let local = local.clone();
                let remote = remote.clone();
                async move { self.blocking(move |s| s.upload(&local, &remote)).await }.boxed()
            })
            .await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        let local: PathBuf = local.to_path_buf();
        let remote = remote.to_string();
        self.retry
            .run("sftp download", || {
                let local = local.clone();
                let remote = remote.clone();
                async move { self.blocking(move |s| s.download(&remote, &local)).await }.boxed()
            })
            .await
    }

    async fn stat(&self, remote: &str) -> Result<RemoteStat> {
        let remote = remote.to_string();
        self.retry
            .run("sftp stat", || {
                let remote = remote.clone();
                async move { self.blocking(move |s| s.stat(&remote)).await }.boxed()
            })
            .await
    }

    async fn exists(&self, remote: &str) -> Result<bool> {
        let remote = remote.to_string();
        self.retry
            .run("sftp stat", || {
                let remote = remote.clone();
                async move { self.blocking(move |s| s.exists(&remote)).await }.boxed()
            })
            .await
    }

    async fn remove(&self, remote: &str) -> Result<()> {
        let remote = remote.to_string();
        self.retry
            .run("sftp remove", || {
                let remote = remote.clone();
                async move { self.blocking(move |s| s.remove(&remote)).await }.boxed()
            })
            .await
    }

    async fn read_text(&self, remote: &str) -> Result<String> {
        let remote = remote.to_string();
        self.retry
            .run("sftp read", || {
                let remote = remote.clone();
                async move { self.blocking(move |s| s.read_text(&remote)).await }.boxed()
            })
            .await
    }
}
