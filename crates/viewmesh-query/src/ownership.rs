//! Partition ownership resolution.
//!
//! Maps a key to the instance currently owning its partition, and lists every
//! owning instance for scatter-gather reads. Local versus remote is decided by
//! comparing against the advertised self identity.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{QueryError, Result};
use crate::platform::{HostInfo, KeyOwner, LogPlatform};

/// Where a key is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// This instance owns the key's partition.
    Local,
    /// Another instance owns the key's partition.
    Remote(HostInfo),
}

/// Resolves keys of one store to their owning instance.
pub struct OwnershipResolver {
    platform: Arc<dyn LogPlatform>,
    store: String,
    self_host: HostInfo,
}

impl OwnershipResolver {
    /// Creates a resolver for `store` on the instance advertised as `self_host`.
    pub fn new(platform: Arc<dyn LogPlatform>, store: impl Into<String>, self_host: HostInfo) -> Self {
        Self {
            platform,
            store: store.into(),
            self_host,
        }
    }

    /// This instance's advertised identity.
    pub fn self_host(&self) -> &HostInfo {
        &self.self_host
    }

    /// Returns true if `host` is not this instance.
    pub fn is_remote(&self, host: &HostInfo) -> bool {
        host != &self.self_host
    }

    /// Instance owning the partition of `key`.
    ///
    /// Fails with [`QueryError::NoOwnerAvailable`] when platform metadata has
    /// not converged. That means "temporarily unresolvable", not "absent".
    pub fn resolve(&self, key: &str) -> Result<HostInfo> {
        match self.platform.resolve_partition_owner(&self.store, key) {
            KeyOwner::Active(host) => Ok(host),
            KeyOwner::NotAvailable => Err(QueryError::NoOwnerAvailable {
                store: self.store.clone(),
                key: key.to_string(),
            }),
        }
    }

    /// Resolves `key` and classifies the owner as local or remote.
    pub fn locate(&self, key: &str) -> Result<Owner> {
        let host = self.resolve(key)?;
        if self.is_remote(&host) {
            Ok(Owner::Remote(host))
        } else {
            Ok(Owner::Local)
        }
    }

    /// Every reachable instance owning part of the store, deduplicated.
    pub fn resolve_all_owners(&self) -> BTreeSet<HostInfo> {
        self.platform
            .list_all_owners(&self.store)
            .into_iter()
            .filter(|meta| {
                if !meta.reachable {
                    tracing::warn!(host = %meta.host, store = %self.store, "skipping unreachable owner");
                }
                meta.reachable
            })
            .map(|meta| meta.host)
            .collect()
    }

    /// Owning instances other than this one.
    pub fn remote_owners(&self) -> Vec<HostInfo> {
        self.resolve_all_owners()
            .into_iter()
            .filter(|host| self.is_remote(host))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCluster;

    fn host(port: u16) -> HostInfo {
        HostInfo::new("127.0.0.1", port)
    }

    fn resolvers(ports: &[u16]) -> (Arc<MemoryCluster>, Vec<OwnershipResolver>) {
        let cluster = MemoryCluster::new(8).unwrap();
        cluster.register_store("orders-store", "orders");
        let resolvers = ports
            .iter()
            .map(|p| {
                let platform = cluster.join(host(*p));
                OwnershipResolver::new(Arc::new(platform), "orders-store", host(*p))
            })
            .collect();
        (cluster, resolvers)
    }

    #[test]
    fn test_single_instance_owns_everything() {
        let (_, resolvers) = resolvers(&[1]);
        for key in ["A1", "B2", "C3"] {
            assert_eq!(resolvers[0].locate(key).unwrap(), Owner::Local);
        }
        assert!(resolvers[0].remote_owners().is_empty());
    }

    #[test]
    fn test_exactly_one_instance_sees_key_as_local() {
        let (cluster, resolvers) = resolvers(&[1, 2, 3]);
        for i in 0..50 {
            let key = format!("order-{}", i);
            let locals = resolvers
                .iter()
                .filter(|r| r.locate(&key).unwrap() == Owner::Local)
                .count();
            assert_eq!(locals, 1);
            assert_eq!(resolvers[0].resolve(&key).unwrap(), cluster.owner_of_key(&key).unwrap());
        }
    }

    #[test]
    fn test_metadata_not_converged() {
        let (cluster, resolvers) = resolvers(&[1, 2]);
        cluster.set_metadata_available(false);

        assert!(matches!(
            resolvers[0].resolve("A1"),
            Err(QueryError::NoOwnerAvailable { .. })
        ));
        assert!(resolvers[0].resolve_all_owners().is_empty());
    }

    #[test]
    fn test_owners_deduplicated_and_unreachable_excluded() {
        let (cluster, resolvers) = resolvers(&[1, 2, 3]);

        let owners = resolvers[0].resolve_all_owners();
        assert_eq!(owners.len(), 3);
        assert_eq!(resolvers[0].remote_owners(), vec![host(2), host(3)]);

        cluster.set_reachable(&host(3), false);
        assert_eq!(resolvers[0].remote_owners(), vec![host(2)]);
    }

    #[test]
    fn test_identity_is_equality_not_reachability() {
        let cluster = MemoryCluster::new(2).unwrap();
        cluster.register_store("orders-store", "orders");
        let platform = cluster.join(host(1));
        let resolver = OwnershipResolver::new(
            Arc::new(platform),
            "orders-store",
            HostInfo::new("localhost", 1),
        );

        assert!(matches!(resolver.locate("A1").unwrap(), Owner::Remote(_)));
    }
}
