//! Read-your-writes confirmation.
//!
//! Publishing and materialization are decoupled by the platform's consumer
//! lag. After a publish, the verifier polls the local view until the expected
//! state shows up or the attempt budget is spent. A failed confirmation does
//! not undo the write; the record stays in the log.

use std::sync::Arc;

use crate::entity::Entity;
use crate::error::QueryError;
use crate::retry::{is_unconfirmed, RetryConfig, RetryExecutor, RetryOutcome};
use crate::view::ViewAccessor;

/// Terminal state of one verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The expected state was observed.
    Confirmed {
        /// Attempts used, including the confirming one.
        attempts: u32,
    },
    /// The budget ran out without observing the expected state.
    Exhausted {
        /// Attempts used.
        attempts: u32,
    },
}

impl Verification {
    /// Returns true if the expected state was observed.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Verification::Confirmed { .. })
    }

    /// Attempts used.
    pub fn attempts(&self) -> u32 {
        match self {
            Verification::Confirmed { attempts } | Verification::Exhausted { attempts } => *attempts,
        }
    }
}

/// Polls the local view to confirm published writes and deletes.
pub struct ConsistencyVerifier<V> {
    view: Arc<ViewAccessor<V>>,
    retry: RetryExecutor,
}

impl<V: Entity> ConsistencyVerifier<V> {
    /// Creates a verifier over `view` with the given confirmation budget.
    pub fn new(view: Arc<ViewAccessor<V>>, budget: RetryConfig) -> Self {
        Self {
            view,
            retry: RetryExecutor::new(budget),
        }
    }

    /// Waits until the view holds exactly `expected` under `key`.
    pub async fn verify_upsert_visible(&self, key: &str, expected: &V) -> Verification {
        let outcome = self
            .retry
            .execute(
                |_| async move {
                    let found = self.view.acquire().await?.get(key)?;
                    if found.as_ref() == Some(expected) {
                        Ok(())
                    } else {
                        Err(QueryError::NotYetVisible {
                            key: key.to_string(),
                        })
                    }
                },
                is_unconfirmed,
            )
            .await;

        let verification = self.conclude(key, outcome);
        if verification.is_confirmed() {
            tracing::info!(key, attempts = verification.attempts(), "found the new entry in the local view");
        } else {
            tracing::warn!(key, "could not find the new entry in the local view, even after retries");
        }
        verification
    }

    /// Waits until the view no longer holds `key`.
    pub async fn verify_delete_visible(&self, key: &str) -> Verification {
        let outcome = self
            .retry
            .execute(
                |_| async move {
                    match self.view.acquire().await?.get(key)? {
                        None => Ok(()),
                        Some(_) => Err(QueryError::NotYetVisible {
                            key: key.to_string(),
                        }),
                    }
                },
                is_unconfirmed,
            )
            .await;

        let verification = self.conclude(key, outcome);
        if verification.is_confirmed() {
            tracing::info!(key, attempts = verification.attempts(), "entry no longer present in the local view");
        } else {
            tracing::warn!(key, "entry still present in the local view, even after retries");
        }
        verification
    }

    fn conclude(&self, key: &str, outcome: RetryOutcome<()>) -> Verification {
        let max = self.retry.config().max_attempts;
        match outcome {
            RetryOutcome::Success { attempts, .. } => Verification::Confirmed { attempts },
            RetryOutcome::Exhausted { attempts, .. } => Verification::Exhausted { attempts },
            RetryOutcome::Aborted { error, attempts } => {
                tracing::warn!(key, attempts, max, "verification stopped: {}", error);
                Verification::Exhausted { attempts }
            }
        }
    }
}
