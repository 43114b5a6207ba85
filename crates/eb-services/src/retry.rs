//! # Retry/Backoff
//!
//! Generic wrapper for remote calls that may fail transiently.

use std::future::Future;
use std::time::Duration;

use eb_core::{AppError, Result};
use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

/// Attempt ceiling and exponential backoff bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    /// Retries immediately; handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt + 1`, without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Backoff plus up to 50% random jitter, still capped at `max_delay`.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_for_attempt(attempt);
        let spread = backoff.as_millis() as u64 / 2;
        if spread == 0 {
            return backoff;
        }
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=spread));
        (backoff + jitter).min(self.max_delay.max(backoff))
    }
}

/// Runs `call` until it succeeds, fails with an error `is_transient` rejects,
/// or the policy's attempt ceiling is reached. The last error is returned.
pub async fn retry_with<T, F, Fut, P>(
    policy: &RetryPolicy,
    is_transient: P,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&AppError) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < attempts && is_transient(&err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// [`retry_with`] using [`AppError::is_transient`] as the predicate.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, operation: &str, call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with(policy, AppError::is_transient, operation, call).await
}
