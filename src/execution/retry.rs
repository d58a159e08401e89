//! Timeout and retry policy for venue calls

use super::ExecutionError;
use crate::config::ExecutionConfig;
use crate::telemetry::{increment, CounterMetric};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Bounded retries with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt deadline
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    ///
    /// Only [`ExecutionError::is_retryable`] failures are retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ExecutionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(self.timeout)),
            };
            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= attempts {
                error!(operation, attempts, error = %err, "Venue call failed, giving up");
                return Err(ExecutionError::RetriesExhausted {
                    attempts,
                    last: err.to_string(),
                });
            }

            let delay = self.backoff(attempt);
            warn!(operation, attempt, ?delay, error = %err, "Venue call failed, retrying");
            increment(CounterMetric::OrderRetries);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
