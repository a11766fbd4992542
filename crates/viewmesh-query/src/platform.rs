//! Boundary to the log platform.
//!
//! The platform is the system of record: a partitioned, replicated,
//! append-only log that each instance materializes into local views. The
//! query core only needs the handful of operations in [`LogPlatform`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Advertised identity of a service instance.
///
/// Two instances are the same instance exactly when host and port are equal;
/// no reachability check is implied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostInfo {
    /// Advertised host name or IP address.
    pub host: String,
    /// Advertised HTTP port.
    pub port: u16,
}

impl HostInfo {
    /// Creates a new HostInfo.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Active owner of the partition containing a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOwner {
    /// The instance currently serving the partition.
    Active(HostInfo),
    /// Platform metadata has not converged; nobody can answer for the key.
    NotAvailable,
}

/// One instance's share of a store, as reported by platform metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerMetadata {
    /// Instance identity.
    pub host: HostInfo,
    /// Partitions this instance currently owns.
    pub partitions: BTreeSet<u32>,
    /// Whether the platform considers the instance reachable.
    pub reachable: bool,
}

/// A point-in-time snapshot of a local materialized view.
pub trait ViewSnapshot: Send + Sync {
    /// Raw payload stored for `key`, if present.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Lazy single pass over every `(key, payload)` pair in the snapshot.
    fn scan(&self) -> Box<dyn Iterator<Item = (String, Vec<u8>)> + Send + '_>;

    /// Number of entries in the snapshot.
    fn len(&self) -> usize;

    /// Returns true if the snapshot holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Operations the query core needs from the log platform.
#[async_trait]
pub trait LogPlatform: Send + Sync + 'static {
    /// Append a keyed record carrying `payload` to `topic`.
    async fn append_record(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()>;

    /// Append a tombstone for `key` to `topic`.
    async fn append_tombstone(&self, topic: &str, key: &str) -> Result<()>;

    /// Instance currently owning the partition of `key` in `store`.
    fn resolve_partition_owner(&self, store: &str, key: &str) -> KeyOwner;

    /// Every instance currently owning at least one partition of `store`.
    fn list_all_owners(&self, store: &str) -> Vec<OwnerMetadata>;

    /// Open this instance's local view of `store`.
    ///
    /// Fails with [`QueryError::ViewNotReady`](crate::error::QueryError::ViewNotReady)
    /// while the view is initializing or being rebuilt after a rebalance.
    fn open_local_view(&self, store: &str) -> Result<Arc<dyn ViewSnapshot>>;
}
