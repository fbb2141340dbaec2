//! Retry Policy
//!
//! Bounded retry with exponential backoff for outbound calls. The policy is a
//! plain value; `retry_with_policy` is the single combinator that consumes it,
//! so every call site (model completions, embedding requests) shares the same
//! loop instead of hand-rolling its own.
//!
//! Delay before retry `n` (zero-based) is `base_delay * backoff_multiplier^n`.
//! With the defaults that is 1s, 2s, 4s, ... There is no sleep after the final
//! attempt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Upper bound for a single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(300);

/// Retry policy for outbound calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_multiplier,
        }
    }

    /// Validate the policy values.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_attempts == 0 {
            return Err(CoreError::validation("max_attempts must be at least 1"));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(CoreError::validation(format!(
                "backoff_multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Delay to wait after the failed attempt with the given zero-based index.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }
}

/// Returned when every attempt allowed by the policy failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Number of attempts made.
    pub attempts: u32,
    /// Error from the final attempt.
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} attempts failed, last error: {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the zero-based attempt index. Every error is retried; callers
/// that need to stop early on permanent failures should encode that in `op`.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        tracing::debug!(
            label,
            attempt = attempt + 1,
            max_attempts,
            "starting attempt"
        );
        match op(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        label,
                        attempt = attempt + 1,
                        max_attempts,
                        "succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                tracing::warn!(
                    label,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %err,
                    "attempt failed"
                );

                if attempt + 1 >= max_attempts {
                    tracing::error!(label, attempts = max_attempts, "all attempts failed");
                    return Err(RetryExhausted {
                        attempts: attempt + 1,
                        last_error: err,
                    });
                }

                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
        }
    }
}
