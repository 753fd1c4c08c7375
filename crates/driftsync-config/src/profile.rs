//! YAML profile loading
//!
//! A profile file is the on-disk form of [`SyncConfig`]; every field is
//! optional and falls back to the defaults. Validation only checks the
//! fields no sync can run without.

use crate::SyncConfig;
use driftsync_types::{Error, Result};
use std::path::Path;

/// Load and validate a profile file
pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<SyncConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("failed to read profile '{}': {}", path.display(), e),
    })?;

    let config: SyncConfig = serde_yaml::from_str(&text).map_err(|e| Error::Config {
        message: format!("failed to parse profile '{}': {}", path.display(), e),
    })?;

    validate(&config)?;
    Ok(config)
}

/// Check the fields a sync run cannot proceed without
pub fn validate(config: &SyncConfig) -> Result<()> {
    if config.connection.host.is_empty() {
        return Err(Error::config("connection.host must be set"));
    }
    if config.connection.user.is_empty() {
        return Err(Error::config("connection.user must be set"));
    }
    if config.replica.local_root.as_os_str().is_empty() {
        return Err(Error::config("replica.local_root must be set"));
    }
    if config.replica.remote_root.is_empty() {
        return Err(Error::config("replica.remote_root must be set"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_minimal_profile() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "connection:\n  host: backup.example\n  user: deploy\n\
             replica:\n  local_root: /home/deploy/project\n  remote_root: /srv/project\n\
             scan:\n  poll_timeout_secs: 300"
        )
        .unwrap();

        let config = load_profile(file.path()).unwrap();
        assert_eq!(config.connection.host, "backup.example");
        assert_eq!(config.scan.poll_timeout_secs, 300);
        // Unspecified sections keep their defaults.
        assert_eq!(config.transfer.max_batch_files, 100);
    }

    #[test]
    fn test_validation_rejects_missing_roots() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "connection:\n  host: backup.example\n  user: deploy").unwrap();

        let err = load_profile(file.path()).unwrap_err();
        assert!(err.to_string().contains("local_root"));
    }

    #[test]
    fn test_unreadable_profile_is_config_error() {
        let err = load_profile("/nonexistent/driftsync.yaml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
