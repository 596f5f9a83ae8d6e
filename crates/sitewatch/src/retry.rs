//! Bounded retry with linear backoff.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Operation in flight
    Attempting,
    /// Waiting before the next attempt
    Retry,
    /// Operation returned a value
    Success,
    /// Attempt bound reached
    Exhausted,
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryState::Attempting => write!(f, "ATTEMPTING"),
            RetryState::Retry => write!(f, "RETRY"),
            RetryState::Success => write!(f, "SUCCESS"),
            RetryState::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }

    pub fn state(&self) -> RetryState {
        match self {
            RetryOutcome::Success { .. } => RetryState::Success,
            RetryOutcome::Exhausted { .. } => RetryState::Exhausted,
        }
    }
}

/// Retry policy: waits `base_delay * attempt` after each failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the attempt following failed attempt `attempt`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Run `op` until it succeeds or the attempt bound is reached.
    ///
    /// `op` receives the 1-based attempt number. Failures never escape as
    /// errors; the caller decides what an exhausted outcome means.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!(label, attempt, state = %RetryState::Attempting, "Running attempt");

            match op(attempt).await {
                Ok(value) => {
                    debug!(label, attempt, state = %RetryState::Success, "Attempt succeeded");
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        label,
                        attempts = attempt,
                        error = %e,
                        state = %RetryState::Exhausted,
                        "Retries exhausted"
                    );
                    return RetryOutcome::Exhausted {
                        last_error: e,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        label,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        state = %RetryState::Retry,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
