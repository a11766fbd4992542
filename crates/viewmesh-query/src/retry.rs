//! Bounded polling with a fixed delay.
//!
//! Waiting for a warming view and confirming a published write or delete all
//! share one loop shape: try, classify the failure as transient or terminal,
//! sleep, try again until the attempt budget runs out. [`RetryExecutor`] is that
//! loop; callers supply the operation and the transient-error predicate.

use std::future::Future;
use std::time::Duration;

use crate::error::{QueryError, Result};

/// Configuration for a bounded polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed delay between two attempts.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a config from an attempt budget and a delay in milliseconds.
    pub fn new(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Budget for waiting on a local view: 100 attempts, 300 ms apart.
    pub fn view_wait() -> Self {
        Self::new(100, 300)
    }

    /// Budget for confirming a write or delete: 10 attempts, 300 ms apart.
    pub fn verification() -> Self {
        Self::new(10, 300)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::view_wait()
    }
}

/// Outcome of a polling loop.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// Operation succeeded.
    Success {
        /// Value produced by the successful attempt.
        value: T,
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed with a transient error.
    Exhausted {
        /// Error of the final attempt.
        last_error: QueryError,
        /// Total number of attempts made.
        attempts: u32,
    },
    /// An attempt failed with a terminal error; no further attempts were made.
    Aborted {
        /// The terminal error.
        error: QueryError,
        /// Attempts made, including the failing one.
        attempts: u32,
    },
}

impl<T> RetryOutcome<T> {
    /// Number of attempts the loop made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Aborted { attempts, .. } => *attempts,
        }
    }

    /// Returns true if the operation eventually succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Success { .. })
    }
}

/// Executor for bounded fixed-delay polling loops.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new RetryExecutor with the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Runs `operation` until it succeeds, fails terminally or the budget is spent.
    ///
    /// `is_transient` decides whether a failure is worth another attempt. The
    /// delay is applied between attempts only, never after the last one. A
    /// budget of zero still makes a single attempt.
    pub async fn execute<F, Fut, T, P>(&self, mut operation: F, is_transient: P) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&QueryError) -> bool,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match operation(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Success {
                        value,
                        attempts: attempt,
                    }
                }
                Err(e) => e,
            };

            if !is_transient(&error) {
                return RetryOutcome::Aborted {
                    error,
                    attempts: attempt,
                };
            }

            if attempt >= max_attempts {
                return RetryOutcome::Exhausted {
                    last_error: error,
                    attempts: attempt,
                };
            }

            tracing::debug!(
                attempt,
                remaining = max_attempts - attempt,
                delay_ms = self.config.delay.as_millis() as u64,
                "transient failure, retrying: {}",
                error
            );
            tokio::time::sleep(self.config.delay).await;
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Transient errors while waiting for a local view.
pub fn is_view_warming(error: &QueryError) -> bool {
    matches!(error, QueryError::ViewNotReady { .. })
}

/// Transient errors while confirming a write or delete.
///
/// A view that is still warming counts as "not yet confirmed", the same as a
/// key that has not reached its expected state.
pub fn is_unconfirmed(error: &QueryError) -> bool {
    matches!(
        error,
        QueryError::ViewNotReady { .. }
            | QueryError::ViewUnavailable { .. }
            | QueryError::NotYetVisible { .. }
    )
}
