//! Retry policy for target writes.
//!
//! The store decides how its failures are retried; the upsert executor only
//! asks the policy for the next delay and gives up when it says so.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{ImportError, Result};

/// Decides whether and when a failed operation is attempted again.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Delay before attempt `attempt + 1`, or `None` to give up.
    /// `attempt` counts the attempts made so far, starting at 1.
    fn next_delay(&self, error: &ImportError, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff over retryable errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry)
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0) spreading delays of concurrent writers
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Fail on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Fixed delay, no backoff and no jitter.
    pub fn fixed_delay(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay after the given attempt (1-based); zero for attempt 0.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // cap attempt to prevent i32 overflow
        let capped_attempt = attempt.min(30);
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(capped_attempt as i32 - 1);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        // deterministic jitter from the golden ratio sequence
        let jitter = if self.jitter_factor > 0.0 {
            let spread = (attempt as f64 * 0.618033988749895) % 1.0;
            capped_delay * self.jitter_factor * (spread - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((capped_delay + jitter).max(0.0) as u64)
    }
}

impl RetryPolicy for RetryConfig {
    fn next_delay(&self, error: &ImportError, attempt: u32) -> Option<Duration> {
        if error.is_retryable() && attempt <= self.max_retries {
            Some(self.delay_for_attempt(attempt))
        } else {
            None
        }
    }
}

/// Run `operation` until it succeeds or the policy gives up.
pub async fn with_retry<T, F, Fut>(policy: &dyn RetryPolicy, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => match policy.next_delay(&e, attempt) {
                Some(delay) => {
                    warn!("{}: {}, retry {} in {:?}", what, e, attempt, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
        }
    }
}
