//! Bounded retry with exponential backoff.
//!
//! Sources are read once at startup, so a transient failure (timeout,
//! connection reset, HTTP 429/5xx) is retried a fixed number of times and
//! then reported. Permanent failures (HTTP 4xx, missing files, bad payloads)
//! are returned immediately.
//!
//! ```ignore
//! let bytes = retry::with_retry(&policy, "network", || read_source(&url)).await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::SourceError;

/// How many times, and how patiently, to retry a source read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay_ms: 1000,
            max_delay_ms: 16_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries `max_attempts` times without sleeping.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before attempt number `attempt` (1-based; the first attempt
    /// never waits).
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let shift = (attempt - 2).min(20);
        let millis = self.initial_delay_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

/// Errors that can tell a retryable failure from a permanent one.
pub trait Transient: Display {
    /// Whether retrying the same operation might succeed.
    fn is_transient(&self) -> bool;
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        Self::is_transient(self)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. Returns the last error in the latter two cases.
///
/// # Errors
///
/// Returns the error from the final attempt.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Transient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            log::warn!("{label}: retry {}/{} in {delay:?}...", attempt - 1, attempts - 1);
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                log::warn!("{label}: transient error: {e}");
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    log::error!("{label}: giving up after {attempts} attempt(s): {e}");
                }
                return Err(e);
            }
        }
    }
}
