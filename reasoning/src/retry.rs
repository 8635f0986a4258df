//! Exponential backoff with jitter for capability calls
//!
//! Each attempt races the cancellation token. Retries stop when attempts
//! run out, when the error is permanent, or when the query's soft deadline
//! has passed (or would pass during the next backoff sleep).

use atlas_async_utils::{Deadline, OrCancelExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Classification the retry loop needs from an error.
pub trait RetryClassifiable {
    fn is_retryable(&self) -> bool;

    /// Server-suggested wait (rate limits), used instead of the computed
    /// backoff when present.
    fn suggested_backoff(&self) -> Option<Duration>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Range check for values read from config files.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than zero".to_string());
        }
        if !self.jitter_factor.is_finite() || !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(format!(
                "jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be a finite value of at least 1, got {}",
                self.backoff_multiplier
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(format!(
                "max_backoff_ms ({}) must not be below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            ));
        }
        Ok(())
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Progress report emitted before each backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryStatus {
    /// Attempt that just failed (1-indexed).
    pub attempt: u32,
    pub elapsed: Duration,
    pub sleep: Duration,
    pub reason: String,
    pub is_rate_limit: bool,
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// Non-retryable failure.
    Permanent { attempts: u32, error: E },
    /// Retryable failure on the last allowed attempt.
    Exhausted { attempts: u32, error: E },
    /// The soft deadline passed; no further attempt was started.
    DeadlineReached { attempts: u32, error: E },
    Cancelled,
}

/// Run `operation` until it succeeds or the policy gives up.
pub async fn execute_with_backoff<F, Fut, T, E, StatusCb>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    deadline: Option<Deadline>,
    mut status_cb: StatusCb,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: RetryClassifiable + fmt::Display + Send,
    StatusCb: FnMut(RetryStatus) + Send,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;
    let mut backoff_ms = policy.initial_backoff_ms;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        attempt = attempt.saturating_add(1);
        let err = match operation().or_cancel(cancel).await {
            Err(_) => return Err(RetryError::Cancelled),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
        };

        if !err.is_retryable() {
            return Err(RetryError::Permanent {
                attempts: attempt,
                error: err,
            });
        }
        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                error: err,
            });
        }

        let (sleep, is_rate_limit) = match err.suggested_backoff() {
            Some(suggested) => (suggested, true),
            None => {
                let base = Duration::from_millis(backoff_ms.min(policy.max_backoff_ms));
                (apply_jitter(base, policy.jitter_factor), false)
            }
        };

        if let Some(deadline) = deadline {
            if deadline.is_expired() || Instant::now() + sleep >= deadline.soft() {
                return Err(RetryError::DeadlineReached {
                    attempts: attempt,
                    error: err,
                });
            }
        }

        let reason = if is_rate_limit {
            format!("rate limited, waiting {sleep:?}")
        } else {
            format!("transient error: {err}, retrying in {sleep:?}")
        };
        status_cb(RetryStatus {
            attempt,
            elapsed: start.elapsed(),
            sleep,
            reason,
            is_rate_limit,
        });

        if wait_with_cancel(cancel, sleep).await.is_err() {
            return Err(RetryError::Cancelled);
        }

        backoff_ms = (backoff_ms as f64 * policy.backoff_multiplier) as u64;
    }
}

async fn wait_with_cancel(cancel: &CancellationToken, duration: Duration) -> Result<(), ()> {
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(()),
    }
}

/// Adds ±`jitter_factor` random variation.
/// Example: 100ms with 0.25 jitter → 75ms to 125ms
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    let jitter_factor = jitter_factor.min(1.0);
    if jitter_factor.is_nan() || jitter_factor <= 0.0 {
        return duration;
    }
    let jitter = rand::rng().random_range(-jitter_factor..=jitter_factor);
    let jittered_ms = (duration.as_millis() as f64 * (1.0 + jitter)).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}
