//! Distributed interactive-query routing.
//!
//! Single-key reads go to the owning instance: the local view when this
//! instance owns the key, otherwise one forwarded peer call. "Get all" reads
//! the local view, then scatters a local-only read to every other owner and
//! gathers the results. One failed peer fails the whole gather.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::client_cache::ClientCache;
use crate::entity::Entity;
use crate::error::{QueryError, Result};
use crate::ownership::{Owner, OwnershipResolver};
use crate::platform::HostInfo;
use crate::remote::RemoteEntityClient;
use crate::view::ViewAccessor;

/// Routes reads for one entity type across the fleet.
pub struct QueryRouter<V, C> {
    resolver: OwnershipResolver,
    view: Arc<ViewAccessor<V>>,
    clients: ClientCache<C>,
    max_concurrent_fanout: Option<usize>,
}

impl<V, C> QueryRouter<V, C>
where
    V: Entity,
    C: RemoteEntityClient<V> + 'static,
{
    /// Creates a router.
    ///
    /// `max_concurrent_fanout` caps in-flight peer calls during "get all";
    /// `None` calls every peer at once.
    pub fn new(
        resolver: OwnershipResolver,
        view: Arc<ViewAccessor<V>>,
        clients: ClientCache<C>,
        max_concurrent_fanout: Option<usize>,
    ) -> Self {
        Self {
            resolver,
            view,
            clients,
            max_concurrent_fanout,
        }
    }

    /// The ownership resolver in use.
    pub fn resolver(&self) -> &OwnershipResolver {
        &self.resolver
    }

    /// The peer client cache in use.
    pub fn clients(&self) -> &ClientCache<C> {
        &self.clients
    }

    /// Reads one entity from whichever instance owns `key`.
    ///
    /// An unresolvable key reads as absent. Peer failures are returned as
    /// errors; there is no local fallback since the data is not held here.
    pub async fn get_one(&self, key: &str) -> Result<Option<V>> {
        tracing::info!(key, "get one");

        let owner = match self.resolver.locate(key) {
            Ok(owner) => owner,
            Err(QueryError::NoOwnerAvailable { store, .. }) => {
                tracing::error!(
                    key,
                    store = %store,
                    "no instance has access to the key, partition metadata unavailable"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match owner {
            Owner::Local => {
                tracing::debug!(key, store = self.view.store(), "querying local store");
                self.view.acquire().await?.get(key)
            }
            Owner::Remote(host) => {
                tracing::debug!(key, %host, "querying remote store");
                let client = self.clients.client_for(&host)?;
                client.get_entry(key).await.map_err(|e| {
                    tracing::error!(key, %host, "remote get failed: {}", e);
                    e
                })
            }
        }
    }

    /// Reads every entity, locally or across the whole fleet.
    ///
    /// The local view is always read first. With `local_only` that is the
    /// answer; otherwise each other owner is asked for its local entries
    /// concurrently and the results are concatenated. Order across hosts is
    /// unspecified.
    pub async fn get_all(&self, local_only: bool) -> Result<Vec<V>> {
        tracing::info!(local_only, "get all");

        let view = self.view.acquire().await?;
        let mut values = Vec::with_capacity(view.len());
        for entry in view.scan_all() {
            let (_, value) = entry?;
            values.push(value);
        }
        drop(view);

        if local_only {
            return Ok(values);
        }

        let peers = self.resolver.remote_owners();
        if peers.is_empty() {
            return Ok(values);
        }

        tracing::info!(peers = peers.len(), "requesting all remote instances");
        let remote = self.gather(peers).await?;
        values.extend(remote.into_iter().flatten());
        Ok(values)
    }

    async fn gather(&self, peers: Vec<HostInfo>) -> Result<Vec<Vec<V>>> {
        let limit = self.max_concurrent_fanout.unwrap_or(peers.len()).max(1);

        let clients = peers
            .into_iter()
            .map(|host| self.clients.client_for(&host).map(|client| (host, client)))
            .collect::<Result<Vec<_>>>()?;

        stream::iter(clients)
            .map(|(host, client)| async move {
                client.get_all_local().await.map_err(|e| {
                    tracing::error!(%host, "remote get all failed, failing aggregate: {}", e);
                    e
                })
            })
            .buffer_unordered(limit)
            .try_collect()
            .await
    }
}
