//! Bounded fixed-delay retry
//!
//! Every page request goes through [`RetryPolicy::run`]. A transient failure
//! (non-200 status, transport error, unreadable body) waits a fixed delay and
//! repeats the same request; the cursor never moves during retries. Once the
//! attempt budget is spent the failure becomes terminal and the crawl stops.

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Attempts per page, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Wait between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// How a single attempt failed
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth trying again
    Transient(String),

    /// Retrying cannot help (e.g., the staging disk is gone)
    Fatal(E),
}

/// Why [`RetryPolicy::run`] gave up
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed transiently
    Exhausted { attempts: u32, last_error: String },

    /// An attempt failed fatally
    Fatal(E),
}

/// Retry configuration with a fixed delay
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `op` until it succeeds, fails fatally, or the budget is spent
    ///
    /// `op` receives the 1-indexed attempt number. The delay is a tokio
    /// sleep, so compression jobs keep running while a page waits.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(AttemptError::Fatal(e)) => return Err(RetryError::Fatal(e)),
                Err(AttemptError::Transient(reason)) => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}",
                        label,
                        attempt,
                        self.max_attempts,
                        reason
                    );

                    if attempt >= self.max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last_error: reason,
                        });
                    }

                    tracing::info!("Waiting {:?} for retry {}", self.delay, attempt);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
