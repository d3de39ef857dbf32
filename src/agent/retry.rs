//! Retry and timeout policy around stage calls
//!
//! Bounded retry with binary exponential backoff and jitter. The default
//! policy makes a single attempt with no timeout.

use crate::cli::config::PipelineConfig;
use crate::errors::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum delay cap (16 seconds)
const MAX_DELAY_MS: u64 = 16000;

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    max_retries: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,

    /// Per-attempt timeout
    stage_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// Single attempt, no timeout
    pub fn new() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1000,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
            stage_timeout: None,
        }
    }

    /// Create policy with custom settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Self::new()
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_config(config.max_retries, config.retry_base_delay_ms)
            .with_stage_timeout(config.stage_timeout())
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// Run `operation` until it succeeds, fails permanently, or retries run out.
    ///
    /// `on_retry` is called with the upcoming attempt number (starting at 2)
    /// and the error that triggered it. The last error is returned unchanged
    /// when retries are exhausted.
    pub async fn execute_with_retry<F, Fut, T, R>(&self, mut operation: F, mut on_retry: R) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        R: FnMut(u32, &PipelineError),
    {
        let mut retries = 0;

        loop {
            let error = match self.attempt(operation()).await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if !error.is_retryable() || retries >= self.max_retries {
                return Err(error);
            }

            retries += 1;
            on_retry(retries + 1, &error);
            tracing::warn!(attempt = retries + 1, error = %error, "Retrying stage");

            sleep(self.calculate_delay(retries)).await;
        }
    }

    async fn attempt<Fut, T>(&self, future: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, future)
                .await
                .map_err(|_| PipelineError::Timeout {
                    duration_ms: limit.as_millis() as u64,
                })?,
            None => future.await,
        }
    }

    /// Calculate delay for given retry number
    fn calculate_delay(&self, retry: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry.saturating_sub(1)));
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // ±25% random variation
        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_default_is_single_attempt() {
        let policy = RetryPolicy::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = policy
            .execute_with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(PipelineError::Backend("HTTP 503".to_string())) }
                },
                |_, _| {},
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let policy = RetryPolicy::with_config(3, 1).without_jitter();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut retries_seen = Vec::new();

        let result = policy
            .execute_with_retry(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(PipelineError::Timeout { duration_ms: 5 })
                        } else {
                            Ok(42)
                        }
                    }
                },
                |attempt, _| retries_seen.push(attempt),
            )
            .await;

        assert_eq!(tokio_test::assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries_seen, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = RetryPolicy::with_config(5, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = policy
            .execute_with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(PipelineError::Infrastructure("qdrant down".to_string())) }
                },
                |_, _| {},
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Infrastructure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stage_timeout() {
        let policy = RetryPolicy::new().with_stage_timeout(Some(Duration::from_millis(10)));

        let result: Result<()> = policy
            .execute_with_retry(
                || async {
                    sleep(Duration::from_secs(5)).await;
                    Ok(())
                },
                |_, _| {},
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Timeout { duration_ms: 10 })));
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy::with_config(10, 1000).without_jitter();
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(2000));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(4000));
        assert_eq!(policy.calculate_delay(8), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn test_from_config() {
        let mut config = PipelineConfig::default();
        config.max_retries = 2;
        config.stage_timeout_secs = Some(30);

        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.stage_timeout(), Some(Duration::from_secs(30)));
    }
}
