//! Bounded retry with exponential backoff.
//!
//! Every remote call goes through [`with_retries`], which distinguishes
//! rate-limit responses (honoring the server's wait hint) from other
//! transient failures (exponential backoff from a configured base).

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, warn};

/// Failure of one remote request, classified so the retry loop can pick
/// the right wait.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The service answered 429; the hint is its suggested wait, if given.
    #[error("rate limited by remote service")]
    RateLimited { retry_after: Option<Duration> },
    /// Timeout, connection error, 5xx, or any other retryable failure.
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

/// Retry bounds shared by all remote calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    /// Wait before the first retry; doubles each subsequent retry.
    pub base: Duration,
}

impl RetryPolicy {
    /// Backoff wait before retry `attempt` (1-based): base * 2^(attempt-1).
    fn backoff(&self, attempt: u32) -> Duration {
        self.base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// On failure the wait is the exponential backoff, unless the failure is a
/// rate limit carrying a server hint, in which case the hint wins. Rate
/// limits count toward the same attempt maximum as other failures. The
/// last error is returned once attempts exceed `max_retries`.
pub async fn with_retries<T, F, Fut>(
    policy: RetryPolicy,
    name: &str,
    mut op: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                let exhausted = attempt > policy.max_retries;
                let wait = match &err {
                    RequestError::RateLimited {
                        retry_after: Some(hint),
                    } => *hint,
                    _ => policy.backoff(attempt),
                };
                if exhausted {
                    error!(
                        operation = name,
                        attempts = attempt,
                        error = %err,
                        "Request failed, retries exhausted"
                    );
                    return Err(err);
                }
                warn!(
                    operation = name,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "Request failed, backing off"
                );
                sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn test_success_is_terminal() {
        let calls = AtomicU32::new(0);
        let result = with_retries(policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RequestError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_bounded_by_policy() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RequestError::Transient(anyhow!("boom"))) }
        })
        .await;
        assert!(result.is_err());
        // max_retries = 3 means at most 4 attempts
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let _: Result<(), _> = with_retries(policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RequestError::Transient(anyhow!("boom"))) }
        })
        .await;
        // Waits of 500 + 1000 + 2000 ms before the three retries
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_overrides_backoff() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = with_retries(policy(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RequestError::RateLimited {
                        retry_after: Some(Duration::from_millis(2000)),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // Exactly the server hint, not the 500ms computed backoff
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_hint_uses_backoff() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = with_retries(policy(), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RequestError::RateLimited { retry_after: None })
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_counts_toward_maximum() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(policy(), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RequestError::RateLimited {
                    retry_after: Some(Duration::from_millis(10)),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
