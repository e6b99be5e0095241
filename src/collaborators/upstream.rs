//! Timeout, cancellation and retry policy for collaborator calls.
//!
//! Reads are idempotent and get one retry. Writes are attempted once. A
//! cancelled call is never retried and surfaces as [`ErrorKind::Upstream`]
//! like any other collaborator failure; callers apply state changes only
//! after the call returned `Ok`.
//!
//! [`ErrorKind::Upstream`]: rollcall_core::ErrorKind::Upstream

use std::future::Future;
use std::time::Duration;

use rollcall_core::AppError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::track_upstream_failure;

const READ_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy)]
pub struct UpstreamPolicy {
    timeout: Duration,
}

enum Failure {
    Cancelled,
    TimedOut,
    Failed(anyhow::Error),
}

impl UpstreamPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Idempotent read, retried once on failure or timeout.
    pub async fn read<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(cancel, call()).await {
                Ok(value) => return Ok(value),
                Err(Failure::Cancelled) => return Err(cancelled(operation)),
                Err(failure) if attempt < READ_ATTEMPTS => {
                    warn!(operation, attempt, error = %describe(&failure), "Upstream read failed, retrying");
                    track_upstream_failure(operation);
                    attempt += 1;
                }
                Err(failure) => {
                    track_upstream_failure(operation);
                    return Err(into_upstream(operation, failure));
                }
            }
        }
    }

    /// Single attempt; writes are never retried.
    pub async fn write<T, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: Fut,
    ) -> Result<T, AppError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match self.attempt(cancel, call).await {
            Ok(value) => Ok(value),
            Err(Failure::Cancelled) => Err(cancelled(operation)),
            Err(failure) => {
                track_upstream_failure(operation);
                Err(into_upstream(operation, failure))
            }
        }
    }

    async fn attempt<T, Fut>(&self, cancel: &CancellationToken, call: Fut) -> Result<T, Failure>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Failure::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(Failure::Failed(e)),
                Err(_) => Err(Failure::TimedOut),
            },
        }
    }
}

fn describe(failure: &Failure) -> String {
    match failure {
        Failure::Cancelled => "cancelled".to_string(),
        Failure::TimedOut => "timed out".to_string(),
        Failure::Failed(e) => format!("{:#}", e),
    }
}

fn cancelled(operation: &'static str) -> AppError {
    AppError::upstream(anyhow::anyhow!("{} was cancelled", operation))
}

fn into_upstream(operation: &'static str, failure: Failure) -> AppError {
    match failure {
        Failure::Failed(e) => AppError::upstream(e.context(format!("{} failed", operation))),
        other => AppError::upstream(anyhow::anyhow!("{} {}", operation, describe(&other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> UpstreamPolicy {
        UpstreamPolicy::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_read_retries_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let counter = calls.clone();
        let value = policy()
            .read("find_lesson", &cancel, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("connection reset");
                    }
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_gives_up_after_second_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let counter = calls.clone();
        let err = policy()
            .read("find_lesson", &cancel, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("connection reset"))
                }
            })
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::Upstream));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();

        let counter = calls.clone();
        let err = policy()
            .write("persist_attendance", &cancel, async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("disk full"))
            })
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::Upstream));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_upstream_and_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let counter = calls.clone();
        let err = policy()
            .read("find_lesson", &cancel, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                }
            })
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::Upstream));
        assert!(calls.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn test_slow_write_times_out() {
        let cancel = CancellationToken::new();
        let err = policy()
            .write("persist_attendance", &cancel, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(err.is(ErrorKind::Upstream));
    }
}
