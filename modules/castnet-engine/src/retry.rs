//! Shared retry policy for external-fetch call sites.
//!
//! One policy object is injected into every adapter through `RunContext`
//! instead of each adapter sprinkling its own backoff constants.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Exponential backoff: base * 3^attempt plus 0-1000ms of random jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts are exhausted; returns the
    /// last error in the latter case.
    pub async fn run<T, F, Fut>(&self, name: &str, op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run_counted(name, op).await.0
    }

    /// Like `run`, but also reports how many upstream calls were actually
    /// issued so budget accounting can charge retries too.
    pub async fn run_counted<T, F, Fut>(&self, name: &str, mut op: F) -> (anyhow::Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempts = 0u32;
        let mut last_err = None;
        for attempt in 0..self.max_attempts.max(1) {
            attempts += 1;
            match op().await {
                Ok(value) => return (Ok(value), attempts),
                Err(e) => {
                    if attempt + 1 < self.max_attempts {
                        let backoff = self.base_delay * 3u32.saturating_pow(attempt);
                        let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                        warn!(
                            op = name,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Operation failed, retrying after backoff"
                        );
                        tokio::time::sleep(backoff + jitter).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        (
            Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{name}: no attempts were made"))),
            attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy()
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        anyhow::bail!("transient");
                    }
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<()> = fast_policy()
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::bail!("permanent") }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn counted_run_reports_every_attempt() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = fast_policy()
            .run_counted("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        anyhow::bail!("transient");
                    }
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 2);

        let (result, attempts): (anyhow::Result<()>, u32) = fast_policy()
            .run_counted("op", || async { anyhow::bail!("permanent") })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        let result = fast_policy()
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
