//! Retry logic with exponential backoff.
//!
//! Transient bus failures (broker unavailable, connection reset) are
//! absorbed inside the adapter by retrying with exponential backoff and
//! jitter. Permanent failures (configuration, commit rejection) are
//! returned immediately.
//!
//! ```text
//! backoff = min(initial_backoff * multiplier^attempt, max_backoff)
//! jittered = backoff * (0.75 + random(0.0, 0.5))
//! ```

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::LogError;

/// Retry policy configuration for exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff duration for a given attempt number (0-indexed), capped at
    /// `max_backoff`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(backoff_ms as u64).min(self.max_backoff)
    }
}

/// Retry an operation with jittered exponential backoff.
///
/// Only transient errors ([`LogError::is_transient`]) are retried; all
/// others are returned on first occurrence. Jitter (±25%) prevents a
/// thundering herd when many workers retry after the same broker failure.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, LogError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LogError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    warn!(error = %err, "non-retryable error, giving up");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %err,
                        "max retries exhausted, giving up"
                    );
                    return Err(err);
                }

                let base = policy.backoff(attempt);
                let jitter = 0.75 + (rand::random::<f64>() * 0.5);
                let backoff = Duration::from_millis((base.as_millis() as f64 * jitter) as u64);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis(),
                    error = %err,
                    "transient error, backing off"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
