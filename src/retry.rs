//! Bounded retry for remote operations.

use crate::error::FetchError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run `attempt` until it succeeds or `policy.max_retries` retries are used up.
///
/// The closure receives the 1-based attempt number. Waits `retry_delay`
/// between attempts, never after the last one.
pub async fn with_retries<T, E, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> Result<T, FetchError>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut n = 1;

    loop {
        match attempt(n).await {
            Ok(value) => {
                if n > 1 {
                    tracing::info!("{} succeeded on attempt {}", operation, n);
                }
                return Ok(value);
            }
            Err(e) if n < max_attempts => {
                tracing::warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    operation,
                    n,
                    max_attempts,
                    e,
                    policy.retry_delay
                );
                tokio::time::sleep(policy.retry_delay).await;
                n += 1;
            }
            Err(e) => {
                tracing::error!("{} failed, retries exhausted: {}", operation, e);
                return Err(FetchError {
                    operation: operation.to_string(),
                    attempts: n,
                    reason: e.to_string(),
                });
            }
        }
    }
}
