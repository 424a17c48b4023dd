//! Retry engine
//!
//! [`retry`] re-runs a unit of work under a [`RetryPolicy`] until it
//! succeeds, the budget runs out or the [`RunContext`] is cancelled. The
//! caller makes the immediate attempt itself; every attempt made here is a
//! retry and is preceded by the policy's delay.
//!
//! Invocations share no state, so one retry task per provider can run
//! concurrently.

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::{ExponentialBackoff, FixedInterval};

use crate::config::{Backoff, RetryConfig};
use crate::context::RunContext;
use crate::error::{Error, Result};

/// Bounded retry schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_delay: Duration,
    max_delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_retries: usize, initial_delay: Duration, max_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            backoff,
        }
    }

    /// Policy retrying up to `max_retries` times without any delay
    pub fn immediate(max_retries: usize) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO, Backoff::Fixed)
    }

    /// Maximum number of retries
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Delay before each retry, in order
    pub fn delays(&self) -> Vec<Duration> {
        let initial_ms = self.initial_delay.as_millis() as u64;

        let delays: Box<dyn Iterator<Item = Duration>> = match self.backoff {
            Backoff::Exponential if initial_ms > 0 => Box::new(
                // base 2 yields 2f, 4f, 8f... so f = initial / 2 starts at `initial`
                ExponentialBackoff::from_millis(2)
                    .factor((initial_ms / 2).max(1))
                    .max_delay(self.max_delay),
            ),
            _ => Box::new(FixedInterval::from_millis(initial_ms)),
        };

        delays
            .map(|d| d.min(self.max_delay))
            .take(self.max_retries)
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff,
        )
    }
}

/// Retry `work` under `policy`
///
/// # Returns
///
/// - `Ok(value)` from the first successful attempt
/// - `Err(Error::RetryExhausted)` wrapping the last error once the budget is
///   spent, or wrapping [`Error::Cancelled`] when `ctx` is cancelled before
///   or between attempts
pub async fn retry<T, F, Fut>(ctx: &RunContext, policy: &RetryPolicy, mut work: F) -> Result<T>
where
    F: FnMut(RunContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;
    let mut last = None;

    for delay in policy.delays() {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                return Err(Error::retry_exhausted(attempts, Error::Cancelled));
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if ctx.is_cancelled() {
            return Err(Error::retry_exhausted(attempts, Error::Cancelled));
        }

        attempts += 1;
        match work(ctx.clone()).await {
            Ok(value) => {
                tracing::debug!("Retry attempt {} succeeded", attempts);
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!("Retry attempt {}/{} failed: {}", attempts, policy.max_retries(), e);
                last = Some(e);
            }
        }
    }

    let last = last.unwrap_or_else(|| Error::Other("retry budget is zero".to_string()));
    Err(Error::retry_exhausted(attempts, last))
}
