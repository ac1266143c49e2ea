//! Waiting out the sheet service's quota.

use std::future::Future;
use std::time::Duration;

use sigla_core::PipelineConfig;
use tracing::warn;

use crate::SyncError;

/// How quota errors are retried.
///
/// A `Retry-After` hint from the service wins over `wait`. Any other error
/// is returned at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub wait: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            wait: Duration::from_secs(config.quota_wait_secs),
            max_attempts: config.quota_max_attempts.max(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying while it reports a quota error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(SyncError::QuotaExceeded { retry_after }) => {
                    if attempt >= self.max_attempts {
                        return Err(SyncError::QuotaExhausted { attempts: attempt });
                    }
                    let wait = retry_after.unwrap_or(self.wait);
                    warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_secs = wait.as_secs(),
                        "sheet service quota exceeded, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            wait: Duration::from_secs(1200),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_quota_errors_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = policy(3)
            .run("read", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SyncError::QuotaExceeded { retry_after: None })
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_wins() {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        policy(2)
            .run("read", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(SyncError::QuotaExceeded {
                        retry_after: Some(Duration::from_secs(5)),
                    })
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let err = policy(3)
            .run("read", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SyncError::QuotaExceeded { retry_after: None })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::QuotaExhausted { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = policy(3)
            .run("read", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(SyncError::UnableToAccessSpreadsheet {
                    spreadsheet_id: "x".into(),
                    reason: "forbidden".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnableToAccessSpreadsheet { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn policy_follows_config() {
        let config = PipelineConfig {
            quota_wait_secs: 30,
            quota_max_attempts: 5,
            ..PipelineConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.wait, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(RetryPolicy::default().wait, Duration::from_secs(1200));
    }
}
