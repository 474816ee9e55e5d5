//! Bounded exponential backoff, shared by traversal and downloads

use crate::config::RetryConfig;
use crate::fetch::FetchError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): base, 2x base, 4x base... capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempts run out
    ///
    /// Only [`FetchError::Transient`] is retried. Cancellation interrupts both the
    /// in-flight attempt and the backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        url: &Url,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = op() => result,
            };

            let message = match result {
                Ok(value) => return Ok(value),
                Err(FetchError::Transient { message, .. }) => message,
                Err(other) => return Err(other),
            };

            if attempt >= self.max_attempts {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    message,
                });
            }

            let delay = self.delay_for(attempt);
            tracing::debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                self.max_attempts,
                url,
                message,
                delay
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay),
            Duration::from_millis(config.max_delay),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(4))
    }

    fn url() -> Url {
        Url::parse("https://agency.se/x.pdf").unwrap()
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let url = url();

        let (calls_ref, url_ref) = (&calls, &url);

        let result = policy(3)
            .run(&url, &cancel, move || async move {
                if calls_ref.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(FetchError::transient(url_ref, "HTTP 503"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let url = url();

        let (calls_ref, url_ref) = (&calls, &url);

        let result: Result<(), _> = policy(3)
            .run(&url, &cancel, move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::transient(url_ref, "timeout"))
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_not_retried() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let url = url();

        let (calls_ref, url_ref) = (&calls, &url);

        let result: Result<(), _> = policy(3)
            .run(&url, &cancel, move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::permanent(url_ref, "HTTP 404"))
            })
            .await;

        assert!(matches!(result, Err(FetchError::Permanent { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let url = url();

        let result: Result<(), _> = policy(3).run(&url, &cancel, || async { Ok(()) }).await;
        assert_eq!(result, Err(FetchError::Cancelled));
    }
}
