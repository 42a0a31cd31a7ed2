use std::{fmt::Display, future::Future, time::Duration};

use super::{AlertError, FetchError, StoreError};

/// Errors that can tell whether another attempt may succeed.
pub trait RetryableError: Display {
    fn is_transient(&self) -> bool;

    /// Error reported when a single attempt exceeds its timeout.
    fn timed_out(op: &'static str, after: Duration) -> Self;
}

impl RetryableError for FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn timed_out(op: &'static str, after: Duration) -> Self {
        Self::Transient(format!("{op} timed out after {}ms", after.as_millis()))
    }
}

impl RetryableError for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn timed_out(op: &'static str, after: Duration) -> Self {
        Self::Transient(format!("{op} timed out after {}ms", after.as_millis()))
    }
}

impl RetryableError for AlertError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn timed_out(op: &'static str, after: Duration) -> Self {
        Self::Transient(format!("{op} timed out after {}ms", after.as_millis()))
    }
}

/// Bounded retry with linear backoff (`retry_backoff * attempt`) and a
/// per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_backoff: Duration, attempt_timeout: Duration) -> Self {
        Self {
            max_retries,
            retry_backoff,
            attempt_timeout,
        }
    }

    /// Runs `f` until it succeeds, fails permanently, or the retry budget is spent.
    pub async fn run<T, E, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, E>
    where
        E: RetryableError,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let res = match tokio::time::timeout(self.attempt_timeout, f()).await {
                Ok(res) => res,
                Err(_elapsed) => Err(E::timed_out(op, self.attempt_timeout)),
            };

            match res {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(error = %e, attempt, op, "transient failure, retrying with backoff");
                    metrics::counter!("retry_attempts_total", "op" => op).increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(error = %e, attempts = attempt + 1, op, "retries exhausted, giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let res: Result<u32, StoreError> = fast_policy(3)
            .run("upsert", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(StoreError::Transient("throttled".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(res, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let res: Result<(), StoreError> = fast_policy(5)
            .run("upsert", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Fatal("bad item".to_string()))
            })
            .await;

        assert!(matches!(res, Err(StoreError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let res: Result<(), FetchError> = fast_policy(2)
            .run("fetch", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Transient("connection reset".to_string()))
            })
            .await;

        assert!(matches!(res, Err(FetchError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_attempts_time_out_as_transient() {
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(5));
        let res: Result<(), AlertError> = policy
            .run("publish", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;

        match res {
            Err(AlertError::Transient(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
