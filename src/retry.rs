use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Bounded exponential backoff for idempotent read-style calls.
///
/// Never wrap a dubbing job submission in this: a retried submission can
/// create a duplicate vendor job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the given retry (1-based): base, 2*base, 4*base...
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }
}

/// Run `operation` until it succeeds, returns a non-transient error, or the
/// attempt budget is spent. The last error is returned on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DubberError;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn transient_error() -> DubberError {
        // Connecting to a closed local port yields a real connect error
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/")
            .timeout(Duration::from_millis(200))
            .send()
            .await
            .unwrap_err();
        DubberError::Http(err)
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_stops_after_budget() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(&policy, "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient_error().await)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy, "lookup", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(transient_error().await)
            } else {
                Ok("ok")
            }
        })
        .await;

        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_with_backoff(&policy, "lookup", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DubberError::Social("404 not found".to_string()))
        })
        .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
