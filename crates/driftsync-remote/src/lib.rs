//! Remote session management for driftsync
//!
//! This crate owns everything that talks to the remote host:
//!
//! - **`Transport`**: the trait boundary every executor works against,
//!   covering command execution, fire-and-forget launches, and the
//!   file-transfer primitives
//! - **`SshTransport`**: the ssh2-backed implementation with
//!   reconnect-on-drop, a keep-alive heartbeat, and retry-with-backoff
//!   around every retryable primitive
//! - **`RetryPolicy`**: an explicit policy object (max attempts +
//!   exponential backoff schedule) applied uniformly by the transport

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod retry;
pub mod ssh;
pub mod transport;

pub use retry::RetryPolicy;
pub use ssh::SshTransport;
pub use transport::Transport;
