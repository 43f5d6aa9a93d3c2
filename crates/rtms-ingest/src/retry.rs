//! Retry policy shared by every upstream call
//!
//! One policy drives every retried operation so attempt counting and backoff are
//! defined in a single place.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum number of attempts, including the first one
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry (in milliseconds)
pub const DEFAULT_BASE_DELAY_MS: u64 = 5_000;

/// Default upper bound for any single backoff delay (in milliseconds)
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base` every time
    Fixed,
    /// `base * attempt`
    #[default]
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

impl std::str::FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" | "constant" => Ok(Backoff::Fixed),
            "linear" => Ok(Backoff::Linear),
            "exponential" | "exp" => Ok(Backoff::Exponential),
            other => Err(format!("Invalid backoff strategy: {other}")),
        }
    }
}

/// Bounded retry with capped backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            backoff: Backoff::default(),
        }
    }
}

/// Every attempt failed
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let millis = match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Linear => self.base_delay_ms.saturating_mul(u64::from(attempt)),
            Backoff::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                self.base_delay_ms.saturating_mul(factor)
            },
        };
        Duration::from_millis(millis.min(self.max_delay_ms))
    }

    /// Run `operation` until it succeeds or `max_attempts` attempts have failed
    ///
    /// The operation receives the 1-based attempt number. Every error it returns is
    /// treated as retryable; callers decide what reaches this loop.
    pub async fn run<T, E, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(context, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(e) if attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        context,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Attempt failed. Retrying in {}ms...",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                },
            }
        }
    }
}
