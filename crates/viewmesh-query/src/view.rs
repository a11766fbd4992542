//! Access to this instance's materialized view.
//!
//! Right after start-up or a rebalance the platform refuses to open the view.
//! That is a warming state, not an empty view, so [`ViewAccessor::acquire`]
//! keeps retrying on a fixed schedule before giving up with
//! [`QueryError::ViewUnavailable`].

use std::marker::PhantomData;
use std::sync::Arc;

use crate::entity::{decode, Entity};
use crate::error::{QueryError, Result};
use crate::platform::{LogPlatform, ViewSnapshot};
use crate::retry::{is_view_warming, RetryConfig, RetryExecutor, RetryOutcome};

/// Opens typed handles onto one local store.
pub struct ViewAccessor<V> {
    platform: Arc<dyn LogPlatform>,
    store: String,
    retry: RetryExecutor,
    _entity: PhantomData<fn() -> V>,
}

impl<V: Entity> ViewAccessor<V> {
    /// Creates an accessor for `store` with the given wait budget.
    pub fn new(platform: Arc<dyn LogPlatform>, store: impl Into<String>, wait: RetryConfig) -> Self {
        Self {
            platform,
            store: store.into(),
            retry: RetryExecutor::new(wait),
            _entity: PhantomData,
        }
    }

    /// Name of the store this accessor reads.
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Acquires a handle, waiting while the view warms up.
    pub async fn acquire(&self) -> Result<LocalView<V>> {
        let outcome = self
            .retry
            .execute(
                |attempt| {
                    let opened = self.platform.open_local_view(&self.store);
                    if let Err(e) = &opened {
                        if is_view_warming(e) {
                            tracing::warn!(
                                store = %self.store,
                                attempt,
                                "local view not queryable yet, retrying in {} ms",
                                self.retry.config().delay.as_millis()
                            );
                        }
                    }
                    async move { opened }
                },
                is_view_warming,
            )
            .await;

        match outcome {
            RetryOutcome::Success { value, .. } => Ok(LocalView::new(value)),
            RetryOutcome::Exhausted { attempts, .. } => {
                tracing::error!(
                    store = %self.store,
                    attempts,
                    "local view still unavailable, giving up"
                );
                Err(QueryError::ViewUnavailable {
                    store: self.store.clone(),
                    attempts,
                })
            }
            RetryOutcome::Aborted { error, .. } => Err(error),
        }
    }
}

/// A typed, successfully acquired handle onto a local view snapshot.
pub struct LocalView<V> {
    snapshot: Arc<dyn ViewSnapshot>,
    _entity: PhantomData<fn() -> V>,
}

impl<V: Entity> LocalView<V> {
    fn new(snapshot: Arc<dyn ViewSnapshot>) -> Self {
        Self {
            snapshot,
            _entity: PhantomData,
        }
    }

    /// Entity stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<V>> {
        self.snapshot.get(key).map(|payload| decode(&payload)).transpose()
    }

    /// Lazy single pass over every entity in the snapshot.
    pub fn scan_all(&self) -> impl Iterator<Item = Result<(String, V)>> + '_ {
        self.snapshot
            .scan()
            .map(|(key, payload)| decode(&payload).map(|value| (key, value)))
    }

    /// Number of entries in the snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Returns true if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}
