//! Error types and handling for driftsync
//!
//! The taxonomy distinguishes transient transport failures (retried with
//! backoff by the connection manager) from fatal per-operation failures
//! (surfaced to the orchestrator, which persists progress before exiting).

/// Main error type for driftsync operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Connection or channel failure during a retryable remote primitive
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure
        message: String,
    },

    /// A required remote command exited non-zero
    #[error("remote command exited {status}: {command}\nstderr: {stderr}")]
    RemoteCommand {
        /// The command that was executed
        command: String,
        /// Exit status reported by the remote shell
        status: i32,
        /// Captured standard error output
        stderr: String,
    },

    /// The remote enumeration marker never appeared within the timeout
    #[error(
        "remote scan did not finish within {seconds}s; \
         inspect {marker} and {output} on the remote manually"
    )]
    ScanTimeout {
        /// Remote marker file the client was polling
        marker: String,
        /// Remote compressed scan output file
        output: String,
        /// Configured poll timeout in seconds
        seconds: u64,
    },

    /// Persisted state or ledger content could not be parsed
    ///
    /// Loaders catch this and degrade to an empty structure; it never
    /// aborts a run on its own.
    #[error("state corruption: {message}")]
    StateCorruption {
        /// What failed to parse
        message: String,
    },

    /// Archive packing or extraction failed
    #[error("archive error: {message}")]
    Archive {
        /// Description of the archive failure
        message: String,
    },

    /// Local I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration issue
        message: String,
    },

    /// Operation timed out
    #[error("operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// Operator requested cancellation between steps
    #[error("operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failures
    Transport,
    /// Remote command failures
    RemoteCommand,
    /// Remote scan timeout
    ScanTimeout,
    /// Unparsable persisted state
    StateCorruption,
    /// Archive failures
    Archive,
    /// Local I/O failures
    Io,
    /// Configuration errors
    Config,
    /// Timeouts
    Timeout,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::RemoteCommand { .. } => ErrorKind::RemoteCommand,
            Self::ScanTimeout { .. } => ErrorKind::ScanTimeout,
            Self::StateCorruption { .. } => ErrorKind::StateCorruption,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Whether the retry policy should re-attempt the failing primitive
    ///
    /// Only transport-level failures and timeouts are transient. A remote
    /// command that ran and exited non-zero is a deterministic failure and
    /// is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new remote command error
    pub fn remote_command<S: Into<String>>(command: S, status: i32, stderr: S) -> Self {
        Self::RemoteCommand {
            command: command.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// Create a new state corruption error
    pub fn state_corruption<S: Into<String>>(message: S) -> Self {
        Self::StateCorruption {
            message: message.into(),
        }
    }

    /// Create a new archive error
    pub fn archive<S: Into<String>>(message: S) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_kind_matches_variant(message in ".*") {
            let errors = vec![
                Error::transport(message.clone()),
                Error::state_corruption(message.clone()),
                Error::archive(message.clone()),
                Error::config(message.clone()),
                Error::other(message.clone()),
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::Transport { .. } => prop_assert_eq!(kind, ErrorKind::Transport),
                    Error::StateCorruption { .. } => {
                        prop_assert_eq!(kind, ErrorKind::StateCorruption)
                    }
                    Error::Archive { .. } => prop_assert_eq!(kind, ErrorKind::Archive),
                    Error::Config { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    Error::Other { .. } => prop_assert_eq!(kind, ErrorKind::Other),
                    _ => {}
                }
            }
        }

        #[test]
        fn test_only_transport_class_retries(status in 1i32..255) {
            let error = Error::remote_command("tar xzf /tmp/x".to_string(), status, String::new());
            prop_assert!(!error.is_transient());
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("missing file"));
    }

    #[test]
    fn test_scan_timeout_names_orphaned_files() {
        let error = Error::ScanTimeout {
            marker: "/tmp/sync_scan_ab.done".to_string(),
            output: "/tmp/sync_scan_ab.tsv.gz".to_string(),
            seconds: 120,
        };

        let text = error.to_string();
        assert!(text.contains("/tmp/sync_scan_ab.done"));
        assert!(text.contains("/tmp/sync_scan_ab.tsv.gz"));
        assert!(!error.is_transient());
    }
}
