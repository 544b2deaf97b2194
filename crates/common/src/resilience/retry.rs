//! Retry with configurable backoff and jitter
//!
//! Used by the job orchestrator for transient understanding-service
//! failures and by sync workers for provider hiccups. Callers decide
//! which errors are retryable; this module only owns the schedule.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Linear backoff: initial_delay + (attempt * increment)
    Linear { initial_delay: Duration, increment: Duration },
    /// Exponential backoff: initial_delay * base^attempt, capped
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay for the given zero-based attempt number.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Linear { initial_delay, increment } => {
                *initial_delay + increment.saturating_mul(attempt)
            }
            Self::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_millis() as f64 * base.powi(attempt as i32);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }
}

/// Jitter applied on top of the calculated delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Full jitter: uniform in [0, delay]
    Full,
    /// Equal jitter: uniform in [delay/2, delay]
    Equal,
}

impl Jitter {
    /// Apply jitter to a calculated delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let mut rng = rand::thread_rng();
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(rng.gen_range(0..=millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + rng.gen_range(0..=millis - half))
            }
        }
    }
}

/// Retry schedule configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (initial try included)
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(500),
                base: 2.0,
                max_delay: Duration::from_secs(32),
            },
            jitter: Jitter::Equal,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following the given zero-based attempt.
    ///
    /// A caller-supplied override (e.g. a provider Retry-After hint)
    /// takes precedence over the computed backoff and is not jittered.
    pub fn delay_for(&self, attempt: u32, override_delay: Option<Duration>) -> Duration {
        match override_delay {
            Some(delay) => delay,
            None => self.jitter.apply(self.backoff.calculate_delay(attempt)),
        }
    }
}

/// Execute an async operation with retries.
///
/// `is_retryable` inspects the error and optionally returns a delay
/// override (e.g. a provider-indicated backoff). Returning `None`
/// stops retrying and surfaces the error; `Some(None)` retries with
/// the configured backoff; `Some(Some(d))` retries after `d`.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> Option<Option<Duration>>,
    E: std::fmt::Display,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(override_delay) = is_retryable(&err) else {
                    debug!(attempt, error = %err, "error is not retryable");
                    return Err(err);
                };

                attempt += 1;
                if attempt >= attempts {
                    warn!(attempt, error = %err, "retry attempts exhausted");
                    return Err(err);
                }

                let delay = config.delay_for(attempt - 1, override_delay);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
