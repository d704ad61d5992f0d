//! # Retry Wrapper
//!
//! Bounded retries with linear backoff around state-changing operations.
//!
//! A [`RetryPolicy`] counts the first attempt toward its bound (three in
//! total by default). After a failed attempt `n` the wrapper sleeps
//! `min(step * n, max_delay)`, optionally shortened by jitter, and tries
//! again. Whether a failure is worth another attempt is decided by the
//! error's [`Retryable`] impl; [`GatewayError`] retries only
//! `TransientNetwork`.
//!
//! # Example
//!
//! ```
//! use omnichain::application::services::retry::{RetryPolicy, execute_with_retry};
//! use omnichain::domain::GatewayError;
//!
//! # async fn example() -> Result<(), GatewayError> {
//! let policy = RetryPolicy::default().with_max_attempts(5);
//! let hash = execute_with_retry(&policy, || async {
//!     Ok::<_, GatewayError>("0xabc".to_string())
//! })
//! .await?;
//! assert_eq!(hash, "0xabc");
//! # Ok(())
//! # }
//! ```

use crate::domain::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Classifies failures as worth another attempt or not.
pub trait Retryable {
    /// Returns true if the failure is transient.
    fn is_retryable(&self) -> bool;
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        GatewayError::is_retryable(self)
    }
}

/// Attempt bound and backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. `1` disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff step in milliseconds; the delay after attempt `n` is `step * n`.
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// Upper bound on a single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Fraction (0.0-1.0) of each delay that may be randomly shaved off.
    #[serde(default)]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_step_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            default_max_attempts(),
            default_step_ms(),
            default_max_delay_ms(),
            0.0,
        )
    }
}

impl RetryPolicy {
    /// Builds a policy; `max_attempts` is raised to 1 and `jitter_factor`
    /// clamped to `[0, 1]`.
    #[must_use]
    pub fn new(max_attempts: u32, step_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            step_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// Single attempt, no backoff.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Sets the attempt bound.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the backoff step.
    #[must_use]
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step_ms = u64::try_from(step.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Delay after failed attempt `attempt` (1-indexed), before jitter.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.step_ms
                .saturating_mul(u64::from(attempt))
                .min(self.max_delay_ms),
        )
    }

    /// [`Self::delay_after`] scaled by `1 - jitter_factor * r`, `r` in `[0, 1)`.
    #[must_use]
    pub fn jittered_delay_after(&self, attempt: u32) -> Duration {
        let delay = self.delay_after(attempt);
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let r: f64 = rand::random();
        delay.mul_f64(1.0 - self.jitter_factor.min(1.0) * r)
    }

    /// Returns true if another attempt fits after `attempts_made`.
    #[must_use]
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Why [`execute_with_retry`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed transiently.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Failure of the final attempt.
        last: E,
        /// Attempts made.
        attempts: u32,
    },
    /// An attempt failed with an error that is not retried.
    #[error("{error}")]
    Terminal {
        /// The failure.
        error: E,
        /// Attempts made, including the failing one.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Terminal { attempts, .. } => *attempts,
        }
    }

    /// The last failure.
    #[must_use]
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Terminal { error, .. } => error,
        }
    }
}

impl From<RetryError<GatewayError>> for GatewayError {
    fn from(err: RetryError<GatewayError>) -> Self {
        match err {
            RetryError::Exhausted { last, attempts } => GatewayError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Terminal { error, .. } => error,
        }
    }
}

/// Runs `operation` under `policy`.
///
/// `operation` is called afresh for every attempt, so anything it builds
/// (nonces, blockhashes) is rebuilt each time.
///
/// # Errors
///
/// Returns [`RetryError::Terminal`] on the first non-retryable failure,
/// or [`RetryError::Exhausted`] once the attempt bound is reached.
pub async fn execute_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !error.is_retryable() {
            return Err(RetryError::Terminal {
                error,
                attempts: attempt,
            });
        }
        if !policy.allows_another(attempt) {
            return Err(RetryError::Exhausted {
                last: error,
                attempts: attempt,
            });
        }

        let delay = policy.jittered_delay_after(attempt);
        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %error,
            "transient failure, retrying"
        );
        sleep(delay).await;
        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::error::TerminalReason;
    use std::sync::Mutex;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, 5, 50, 0.0)
    }

    /// Replays `script` one entry per attempt, recording how many were used.
    fn scripted(
        script: Vec<Result<&'static str, GatewayError>>,
    ) -> (Mutex<std::vec::IntoIter<Result<&'static str, GatewayError>>>, Mutex<u32>) {
        (Mutex::new(script.into_iter()), Mutex::new(0))
    }

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.step_ms, 1_000);
        assert_eq!(policy.max_delay_ms, 10_000);
        assert!(!RetryPolicy::no_retry().allows_another(1));
    }

    #[test]
    fn constructor_clamps_inputs() {
        let policy = RetryPolicy::new(0, 10, 100, 3.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.jitter_factor, 1.0);
        assert_eq!(
            RetryPolicy::default().with_step(Duration::from_millis(250)).step_ms,
            250
        );
    }

    #[test]
    fn backoff_is_linear_then_capped() {
        let policy = RetryPolicy::new(10, 100, 250, 0.0);
        let delays: Vec<_> = (1..=4).map(|n| policy.delay_after(n).as_millis()).collect();
        assert_eq!(delays, [100, 200, 250, 250]);
    }

    #[test]
    fn jitter_only_shortens() {
        let policy = RetryPolicy::new(3, 1_000, 10_000, 0.5);
        for _ in 0..20 {
            let delay = policy.jittered_delay_after(2);
            assert!(delay <= Duration::from_millis(2_000));
            assert!(delay >= Duration::from_millis(1_000));
        }
    }

    #[test]
    fn partial_policy_fills_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy, RetryPolicy::default().with_max_attempts(5));
    }

    #[tokio::test]
    async fn transient_twice_then_success() {
        let (script, calls) = scripted(vec![
            Err(GatewayError::transient("connection reset")),
            Err(GatewayError::transient("timed out")),
            Ok("0xabc"),
        ]);

        let result = execute_with_retry(&fast(3), || {
            *calls.lock().unwrap() += 1;
            let next = script.lock().unwrap().next().unwrap();
            async move { next }
        })
        .await;

        assert_eq!(result.unwrap(), "0xabc");
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let (script, calls) = scripted(vec![
            Err(GatewayError::terminal(
                TerminalReason::InsufficientFunds,
                "insufficient funds for gas",
            )),
            Ok("unreachable"),
        ]);

        let err = execute_with_retry(&fast(3), || {
            *calls.lock().unwrap() += 1;
            let next = script.lock().unwrap().next().unwrap();
            async move { next }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Terminal { attempts: 1, .. }));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(
            GatewayError::from(err).terminal_reason(),
            Some(TerminalReason::InsufficientFunds)
        );
    }

    #[tokio::test]
    async fn exhaustion_carries_last_error_and_count() {
        let (script, calls) = scripted(vec![
            Err(GatewayError::transient("connection reset")),
            Err(GatewayError::transient("502 bad gateway")),
            Err(GatewayError::transient("429 too many requests")),
        ]);

        let err = execute_with_retry(&fast(3), || {
            *calls.lock().unwrap() += 1;
            let next = script.lock().unwrap().next().unwrap();
            async move { next }
        })
        .await
        .unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(
            GatewayError::from(err),
            GatewayError::RetriesExhausted {
                attempts: 3,
                last: Box::new(GatewayError::transient("429 too many requests")),
            }
        );
    }

    #[test]
    fn terminal_display_is_the_inner_error() {
        let err = RetryError::Terminal {
            error: GatewayError::decode("bad payload"),
            attempts: 1,
        };
        assert_eq!(err.to_string(), GatewayError::decode("bad payload").to_string());
        assert_eq!(err.into_inner(), GatewayError::decode("bad payload"));
    }
}
