//! Retry policy
//!
//! Explicit retry configuration for fallible operations: bounded attempts
//! for the historical backfill, unbounded for long-running monitors.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How often and how patiently to retry one fallible operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Fixed pause between attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Give up after `max_attempts` tries.
    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    /// Retry forever; a long-running monitor should not give up.
    pub fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent, sleeping
    /// `backoff` between attempts. Returns the last error when exhausted.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            warn!(%what, attempt, error = %err, "retries exhausted");
                            return Err(err);
                        }
                    }
                    warn!(
                        %what,
                        attempt,
                        backoff_ms = self.backoff.as_millis() as u64,
                        error = %err,
                        "operation failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_succeeds_after_transient_failures() {
        tokio_test::block_on(async {
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy::bounded(5, Duration::from_millis(1));

            let result: Result<u32, String> = policy
                .run("flaky", || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("boom".to_string())
                        } else {
                            Ok(n)
                        }
                    }
                })
                .await;

            assert_eq!(result.unwrap(), 2);
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        });
    }

    #[test]
    fn test_bounded_policy_gives_up() {
        tokio_test::block_on(async {
            let calls = AtomicU32::new(0);
            let policy = RetryPolicy::bounded(3, Duration::from_millis(1));

            let result: Result<(), String> = policy
                .run("hopeless", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("always".to_string()) }
                })
                .await;

            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        });
    }
}
