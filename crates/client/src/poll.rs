//! # Poll-Until and Retry with Backoff
//!
//! The read side lags behind the chain: after a transaction executes, the
//! backend projection may not show the new profile, community or vote for a
//! few seconds. Every write flow reconciles through [`poll_until`] instead of
//! hand-rolled loops.
//!
//! ## Design
//!
//! - Delay strategies: fixed, linear (`initial + step * (attempt-1)`),
//!   exponential (`initial * multiplier^(attempt-1)`, clamped)
//! - `attempts <= max_attempts`, always
//! - Fetch errors consume an attempt; they are the normal shape of lag
//! - Exhaustion is an `Err`, callers decide to proceed optimistically
//! - No busy loop: every retry path sleeps (zero delay only in tests)
//!
//! [`retry_with_backoff`] is the write-side sibling used around wallet
//! signing: it stops early on errors the caller marks as non-retryable.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

// ════════════════════════════════════════════════════════════════════════════════
// DELAY STRATEGY
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum DelayStrategy {
    /// Same delay after every attempt.
    Fixed { delay_ms: u64 },
    /// `initial_ms + step_ms * (attempt - 1)`.
    Linear { initial_ms: u64, step_ms: u64 },
    /// `min(initial_ms * multiplier^(attempt - 1), max_ms)`.
    Exponential {
        initial_ms: u64,
        multiplier: f64,
        max_ms: u64,
    },
}

impl DelayStrategy {
    /// Compute the delay in milliseconds after a given attempt (1-indexed).
    ///
    /// All arithmetic saturates; exponential values are clamped to
    /// `[0, max_ms]` so NaN and infinities cannot escape.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        match *self {
            DelayStrategy::Fixed { delay_ms } => delay_ms,
            DelayStrategy::Linear { initial_ms, step_ms } => {
                initial_ms.saturating_add(step_ms.saturating_mul(exponent as u64))
            }
            DelayStrategy::Exponential {
                initial_ms,
                multiplier,
                max_ms,
            } => {
                let base = (initial_ms as f64) * multiplier.powi(exponent as i32);
                let max = max_ms as f64;
                let clamped = if base.is_nan() || base < 0.0 {
                    0.0
                } else if base > max {
                    max
                } else {
                    base
                };
                (clamped as u64).min(max_ms)
            }
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// POLL CONFIG
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Maximum number of fetches (including the first). 0 means no fetch at all.
    pub max_attempts: u32,
    pub delay: DelayStrategy,
}

impl PollConfig {
    pub fn new(max_attempts: u32, delay: DelayStrategy) -> Self {
        Self { max_attempts, delay }
    }

    /// Profile creation: 15 attempts, 1 s apart.
    pub fn profile() -> Self {
        Self::new(15, DelayStrategy::Fixed { delay_ms: 1_000 })
    }

    /// Community creation / membership: 10 attempts, 1 s growing by 1 s.
    pub fn community() -> Self {
        Self::new(
            10,
            DelayStrategy::Linear {
                initial_ms: 1_000,
                step_ms: 1_000,
            },
        )
    }

    /// Proposal creation / finalization: 5 attempts, 1 s growing by 1 s.
    pub fn proposal() -> Self {
        Self::new(
            5,
            DelayStrategy::Linear {
                initial_ms: 1_000,
                step_ms: 1_000,
            },
        )
    }

    /// Vote confirmation: 5 attempts, 1 s apart.
    pub fn vote() -> Self {
        Self::new(5, DelayStrategy::Fixed { delay_ms: 1_000 })
    }

    /// Zero-delay config, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, DelayStrategy::Fixed { delay_ms: 0 })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("read side did not catch up after {attempts} attempts")]
    TimeoutExhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

// ════════════════════════════════════════════════════════════════════════════════
// POLL UNTIL
// ════════════════════════════════════════════════════════════════════════════════

/// Fetch until `predicate` accepts the value or the budget runs out.
///
/// # Behavior
///
/// 1. Call `fetch()` (attempt starts at 1).
/// 2. `Ok(v)` and `predicate(&v)` → return `Ok(v)`.
/// 3. Otherwise, if `attempt >= max_attempts` → `Err(TimeoutExhausted)`.
/// 4. Sleep `delay(attempt)` and go again.
pub async fn poll_until<F, Fut, T, E, P>(config: &PollConfig, mut fetch: F, mut predicate: P) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    P: FnMut(&T) -> bool,
{
    let mut last_error: Option<String> = None;
    let mut attempt: u32 = 0;

    while attempt < config.max_attempts {
        attempt = attempt.saturating_add(1);

        match fetch().await {
            Ok(value) if predicate(&value) => return Ok(value),
            Ok(_) => {
                debug!(attempt, max_attempts = config.max_attempts, "projection not caught up yet");
            }
            Err(e) => {
                debug!(attempt, max_attempts = config.max_attempts, error = %e, "poll fetch failed");
                last_error = Some(e.to_string());
            }
        }

        if attempt < config.max_attempts {
            let delay = config.delay.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(PollError::TimeoutExhausted {
        attempts: attempt,
        last_error,
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// RETRY WITH BACKOFF
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub delay: DelayStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: DelayStrategy::Exponential {
                initial_ms: 1_000,
                multiplier: 2.0,
                max_ms: 8_000,
            },
        }
    }
}

impl RetryConfig {
    /// Linear backoff used where a wallet prompt is retried in place.
    pub fn linear(max_attempts: u32, step_ms: u64) -> Self {
        Self {
            max_attempts,
            delay: DelayStrategy::Linear {
                initial_ms: step_ms,
                step_ms,
            },
        }
    }
}

/// Outcome of a failed retry loop: the last error and how many attempts ran.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub last_error: E,
    pub attempts: u32,
}

/// Execute an async operation, retrying while `should_retry` accepts the error.
///
/// Returns the value with the number of attempts used, or the last error.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: R,
) -> Result<(T, u32), RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    R: Fn(&E) -> bool,
{
    let max = config.max_attempts.max(1);
    let mut attempts: u32 = 0;

    loop {
        attempts = attempts.saturating_add(1);

        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if !should_retry(&e) || attempts >= max {
                    return Err(RetryExhausted { last_error: e, attempts });
                }

                let delay = config.delay.delay(attempts);
                debug!(attempt = attempts, max_attempts = max, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════
