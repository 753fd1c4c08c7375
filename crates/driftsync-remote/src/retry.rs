//! Explicit retry policy with exponential backoff

use driftsync_config::RetryConfig;
use driftsync_types::Result;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy applied uniformly to retryable remote primitives.
///
/// Only errors classified as transient are re-attempted; everything else
/// (non-zero remote exits, local I/O failures) surfaces on the first try.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts before the failure is surfaced
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each further attempt
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with explicit parameters
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Build the policy from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay(), config.max_delay())
    }

    /// Run `op`, re-invoking it on transient failure until the attempt
    /// ceiling is reached
    pub async fn run<'a, T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'a, Result<T>> + 'a,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.max_attempts && error.is_transient() => {
                    warn!(
                        "{what} failed (attempt {attempt}/{}): {error}",
                        self.max_attempts
                    );
                    debug!("retrying in {}s", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_types::Error;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(5)
            .run("probe", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::transport("flaky channel"))
                    } else {
                        Ok(n)
                    }
                }
                .boxed()
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempt_ceiling_surfaces_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("probe", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::transport("still down")) }.boxed()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(5)
            .run("extract", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::remote_command("tar xzf x".to_string(), 2, String::new())) }
                    .boxed()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
