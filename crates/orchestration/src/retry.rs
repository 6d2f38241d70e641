//! Bounded retry with exponential backoff and jitter.
//!
//! Only [`RemoteCallError`]s whose [`crate::RetryPolicy`] is `Retryable` are
//! retried. A server-provided minimum delay (`Retry-After`) always wins over a
//! shorter computed backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::RemoteCallError;

/// Retry budget and backoff schedule for boundary calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first call. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub initial_backoff: Duration,
    /// Upper bound for the computed (not server-requested) delay.
    pub max_backoff: Duration,
    /// Randomise each delay to between half and all of its computed value.
    pub jitter: bool,
}

impl RetryConfig {
    /// Default total attempts per call.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// A schedule that retries `max_attempts` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32, server_hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        let computed = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        let computed = if self.jitter {
            equal_jitter(computed)
        } else {
            computed
        };
        match server_hint {
            Some(hint) => computed.max(hint),
            None => computed,
        }
    }

    /// Runs `call` until it succeeds, fails permanently, or the attempt budget
    /// is spent.
    ///
    /// With `enabled == false` exactly one attempt is made. Returns the result
    /// together with the number of attempts made.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        description: &str,
        enabled: bool,
        mut call: F,
    ) -> (Result<T, RemoteCallError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteCallError>>,
    {
        let max_attempts = if enabled { self.max_attempts.max(1) } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(%description, attempt, max_attempts, "calling boundary");

            match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(error) if !error.is_retryable() => {
                    debug!(%description, attempt, %error, "permanent boundary failure");
                    return (Err(error), attempt);
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(
                        %description,
                        attempt,
                        max_attempts,
                        %error,
                        "retry budget exhausted"
                    );
                    return (Err(error), attempt);
                }
                Err(error) => {
                    let backoff = self.backoff_for(attempt, error.retry_after());
                    warn!(
                        %description,
                        attempt,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        %error,
                        "transient boundary failure, retrying"
                    );
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: true,
        }
    }
}

fn equal_jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
    half + Duration::from_millis(rand::rng().random_range(0..=spread))
}
