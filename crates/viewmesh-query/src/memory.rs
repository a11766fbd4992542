//! In-process log platform.
//!
//! [`MemoryCluster`] keeps an append-only log per topic, assigns partitions to
//! the instances that joined, and materializes records into one view per
//! instance. Appending and materializing are separate steps, so readers see
//! the same lag a real consumer would introduce. Each instance talks to the
//! cluster through its own [`MemoryPlatform`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::error::{QueryError, Result};
use crate::partitioner::partition_for;
use crate::platform::{HostInfo, KeyOwner, LogPlatform, OwnerMetadata, ViewSnapshot};

type ViewMap = BTreeMap<String, Vec<u8>>;

/// A single record in a topic log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Partition the key hashes to.
    pub partition: u32,
    /// Record key.
    pub key: String,
    /// Payload, or `None` for a tombstone.
    pub payload: Option<Vec<u8>>,
}

struct HostState {
    views: HashMap<String, Arc<ViewMap>>,
    ready: bool,
    reachable: bool,
}

impl HostState {
    fn new() -> Self {
        Self {
            views: HashMap::new(),
            ready: false,
            reachable: true,
        }
    }
}

struct ClusterState {
    partitions: u32,
    /// store name -> topic
    stores: HashMap<String, String>,
    logs: HashMap<String, Vec<LogRecord>>,
    /// topic -> number of records already materialized
    applied: HashMap<String, usize>,
    hosts: BTreeMap<HostInfo, HostState>,
    assignment: Vec<Option<HostInfo>>,
    metadata_available: bool,
    needs_rebuild: bool,
}

impl ClusterState {
    fn rebalance(&mut self) {
        let members: Vec<HostInfo> = self.hosts.keys().cloned().collect();
        self.assignment = (0..self.partitions as usize)
            .map(|p| {
                if members.is_empty() {
                    None
                } else {
                    Some(members[p % members.len()].clone())
                }
            })
            .collect();

        for state in self.hosts.values_mut() {
            state.ready = false;
        }
        self.needs_rebuild = true;
    }

    fn owner_of(&self, partition: u32) -> Option<&HostInfo> {
        self.assignment
            .get(partition as usize)
            .and_then(|owner| owner.as_ref())
    }

    fn stores_for_topic(&self, topic: &str) -> Vec<String> {
        self.stores
            .iter()
            .filter(|(_, t)| t.as_str() == topic)
            .map(|(store, _)| store.clone())
            .collect()
    }

    /// Replays every log from the start into fresh views for the current assignment.
    fn rebuild(&mut self) -> usize {
        let mut fresh: BTreeMap<HostInfo, HashMap<String, ViewMap>> = self
            .hosts
            .keys()
            .map(|h| (h.clone(), HashMap::new()))
            .collect();
        let mut replayed = 0;

        for (topic, records) in &self.logs {
            let stores = self.stores_for_topic(topic);
            for record in records {
                let Some(owner) = self.owner_of(record.partition) else {
                    continue;
                };
                let Some(views) = fresh.get_mut(owner) else {
                    continue;
                };
                for store in &stores {
                    apply(views.entry(store.clone()).or_default(), record);
                }
                replayed += 1;
            }
            self.applied.insert(topic.clone(), records.len());
        }

        for (host, views) in fresh {
            if let Some(state) = self.hosts.get_mut(&host) {
                state.views = views.into_iter().map(|(s, v)| (s, Arc::new(v))).collect();
                state.ready = true;
            }
        }
        self.needs_rebuild = false;
        replayed
    }

    /// Applies records appended since the last pass to their owners' views.
    fn catch_up(&mut self) -> usize {
        let mut applied_now = 0;
        let topics: Vec<String> = self.logs.keys().cloned().collect();

        for topic in topics {
            let start = self.applied.get(&topic).copied().unwrap_or(0);
            let pending: Vec<LogRecord> = match self.logs.get(&topic) {
                Some(records) if records.len() > start => records[start..].to_vec(),
                _ => continue,
            };
            let stores = self.stores_for_topic(&topic);

            for record in &pending {
                let Some(owner) = self.owner_of(record.partition).cloned() else {
                    continue;
                };
                let Some(state) = self.hosts.get_mut(&owner) else {
                    continue;
                };
                for store in &stores {
                    let view = state.views.entry(store.clone()).or_default();
                    apply(Arc::make_mut(view), record);
                }
            }

            applied_now += pending.len();
            self.applied.insert(topic, start + pending.len());
        }
        applied_now
    }
}

fn apply(view: &mut ViewMap, record: &LogRecord) {
    match &record.payload {
        Some(payload) => {
            view.insert(record.key.clone(), payload.clone());
        }
        None => {
            view.remove(&record.key);
        }
    }
}

/// Shared state of an in-process cluster of instances.
pub struct MemoryCluster {
    state: RwLock<ClusterState>,
}

impl MemoryCluster {
    /// Creates a cluster whose topics all have `partitions` partitions.
    pub fn new(partitions: u32) -> Result<Arc<Self>> {
        if partitions == 0 {
            return Err(QueryError::InvalidConfig(
                "partition count must be at least 1".to_string(),
            ));
        }

        Ok(Arc::new(Self {
            state: RwLock::new(ClusterState {
                partitions,
                stores: HashMap::new(),
                logs: HashMap::new(),
                applied: HashMap::new(),
                hosts: BTreeMap::new(),
                assignment: vec![None; partitions as usize],
                metadata_available: true,
                needs_rebuild: false,
            }),
        }))
    }

    /// Materializes `topic` into a store called `store` on every instance.
    pub fn register_store(&self, store: &str, topic: &str) {
        let mut state = self.state.write();
        state.stores.insert(store.to_string(), topic.to_string());
        state.logs.entry(topic.to_string()).or_default();
        state.needs_rebuild = true;
    }

    /// Adds an instance and rebalances partitions; returns its platform handle.
    ///
    /// Every view is unqueryable until the next [`materialize`](Self::materialize).
    pub fn join(self: &Arc<Self>, host: HostInfo) -> MemoryPlatform {
        {
            let mut state = self.state.write();
            state.hosts.entry(host.clone()).or_insert_with(HostState::new);
            state.rebalance();
        }
        tracing::debug!("instance {} joined, partitions rebalanced", host);
        self.platform(host)
    }

    /// Removes an instance and rebalances partitions.
    pub fn leave(&self, host: &HostInfo) -> bool {
        let mut state = self.state.write();
        let removed = state.hosts.remove(host).is_some();
        if removed {
            state.rebalance();
            tracing::debug!("instance {} left, partitions rebalanced", host);
        }
        removed
    }

    /// Platform handle for an instance, without changing membership.
    pub fn platform(self: &Arc<Self>, host: HostInfo) -> MemoryPlatform {
        MemoryPlatform {
            cluster: Arc::clone(self),
            local: host,
        }
    }

    /// Applies pending records to the views; returns how many were applied.
    ///
    /// After a rebalance this rebuilds every view from the full log and marks
    /// the views queryable again.
    pub fn materialize(&self) -> usize {
        let mut state = self.state.write();
        if state.needs_rebuild {
            state.rebuild()
        } else {
            state.catch_up()
        }
    }

    /// Runs [`materialize`](Self::materialize) every `interval` until aborted.
    pub fn spawn_materializer(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cluster = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let applied = cluster.materialize();
                if applied > 0 {
                    tracing::trace!(applied, "materialized records");
                }
            }
        })
    }

    /// Number of appended records not yet visible in any view.
    pub fn pending_records(&self) -> usize {
        let state = self.state.read();
        if state.needs_rebuild {
            return state.logs.values().map(Vec::len).sum();
        }
        state
            .logs
            .iter()
            .map(|(topic, records)| records.len() - state.applied.get(topic).copied().unwrap_or(0))
            .sum()
    }

    /// Full contents of a topic log.
    pub fn log(&self, topic: &str) -> Vec<LogRecord> {
        self.state.read().logs.get(topic).cloned().unwrap_or_default()
    }

    /// Marks an instance's views as warming (`false`) or queryable (`true`).
    pub fn set_view_ready(&self, host: &HostInfo, ready: bool) {
        if let Some(state) = self.state.write().hosts.get_mut(host) {
            state.ready = ready;
        }
    }

    /// Makes partition metadata unavailable cluster-wide, or restores it.
    pub fn set_metadata_available(&self, available: bool) {
        self.state.write().metadata_available = available;
    }

    /// Marks an instance as unreachable in ownership metadata.
    pub fn set_reachable(&self, host: &HostInfo, reachable: bool) {
        if let Some(state) = self.state.write().hosts.get_mut(host) {
            state.reachable = reachable;
        }
    }

    /// Partitions currently assigned to `host`.
    pub fn partitions_of(&self, host: &HostInfo) -> BTreeSet<u32> {
        let state = self.state.read();
        state
            .assignment
            .iter()
            .enumerate()
            .filter(|(_, owner)| owner.as_ref() == Some(host))
            .map(|(p, _)| p as u32)
            .collect()
    }

    /// Instance that owns `key`, ignoring metadata availability.
    pub fn owner_of_key(&self, key: &str) -> Option<HostInfo> {
        let state = self.state.read();
        let partition = partition_for(key, state.partitions);
        state.owner_of(partition).cloned()
    }

    fn append(&self, topic: &str, key: &str, payload: Option<Vec<u8>>) -> Result<()> {
        let mut state = self.state.write();
        let partition = partition_for(key, state.partitions);
        let log = state
            .logs
            .get_mut(topic)
            .ok_or_else(|| QueryError::UnknownStore(topic.to_string()))?;
        log.push(LogRecord {
            partition,
            key: key.to_string(),
            payload,
        });
        Ok(())
    }
}

/// Point-in-time copy of one instance's view.
pub struct MemorySnapshot {
    entries: Arc<ViewMap>,
}

impl ViewSnapshot for MemorySnapshot {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn scan(&self) -> Box<dyn Iterator<Item = (String, Vec<u8>)> + Send + '_> {
        Box::new(self.entries.iter().map(|(k, v)| (k.clone(), v.clone())))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One instance's handle onto a [`MemoryCluster`].
#[derive(Clone)]
pub struct MemoryPlatform {
    cluster: Arc<MemoryCluster>,
    local: HostInfo,
}

impl MemoryPlatform {
    /// Identity of the instance this handle belongs to.
    pub fn local_host(&self) -> &HostInfo {
        &self.local
    }

    /// The shared cluster.
    pub fn cluster(&self) -> &Arc<MemoryCluster> {
        &self.cluster
    }
}

#[async_trait]
impl LogPlatform for MemoryPlatform {
    async fn append_record(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        self.cluster.append(topic, key, Some(payload))
    }

    async fn append_tombstone(&self, topic: &str, key: &str) -> Result<()> {
        self.cluster.append(topic, key, None)
    }

    fn resolve_partition_owner(&self, store: &str, key: &str) -> KeyOwner {
        let state = self.cluster.state.read();
        if !state.metadata_available || !state.stores.contains_key(store) {
            return KeyOwner::NotAvailable;
        }
        let partition = partition_for(key, state.partitions);
        match state.owner_of(partition) {
            Some(host) => KeyOwner::Active(host.clone()),
            None => KeyOwner::NotAvailable,
        }
    }

    fn list_all_owners(&self, store: &str) -> Vec<OwnerMetadata> {
        let state = self.cluster.state.read();
        if !state.metadata_available || !state.stores.contains_key(store) {
            return Vec::new();
        }

        let mut owners: BTreeMap<HostInfo, BTreeSet<u32>> = BTreeMap::new();
        for (partition, owner) in state.assignment.iter().enumerate() {
            if let Some(host) = owner {
                owners.entry(host.clone()).or_default().insert(partition as u32);
            }
        }

        owners
            .into_iter()
            .map(|(host, partitions)| {
                let reachable = state.hosts.get(&host).map(|h| h.reachable).unwrap_or(false);
                OwnerMetadata {
                    host,
                    partitions,
                    reachable,
                }
            })
            .collect()
    }

    fn open_local_view(&self, store: &str) -> Result<Arc<dyn ViewSnapshot>> {
        let state = self.cluster.state.read();
        if !state.stores.contains_key(store) {
            return Err(QueryError::UnknownStore(store.to_string()));
        }

        let host = state
            .hosts
            .get(&self.local)
            .filter(|h| h.ready)
            .ok_or_else(|| QueryError::ViewNotReady {
                store: store.to_string(),
            })?;

        let entries = host.views.get(store).cloned().unwrap_or_default();
        Ok(Arc::new(MemorySnapshot { entries }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(port: u16) -> HostInfo {
        HostInfo::new("127.0.0.1", port)
    }

    fn cluster_with(hosts: &[u16]) -> (Arc<MemoryCluster>, Vec<MemoryPlatform>) {
        let cluster = MemoryCluster::new(6).unwrap();
        cluster.register_store("orders-store", "orders");
        let platforms = hosts.iter().map(|p| cluster.join(host(*p))).collect();
        cluster.materialize();
        (cluster, platforms)
    }

    #[test]
    fn test_zero_partitions_rejected() {
        assert!(matches!(
            MemoryCluster::new(0),
            Err(QueryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_round_robin_assignment_is_exclusive() {
        let (cluster, _) = cluster_with(&[1, 2, 3]);
        let mut seen = BTreeSet::new();
        for p in [1, 2, 3] {
            let parts = cluster.partitions_of(&host(p));
            assert_eq!(parts.len(), 2);
            for part in parts {
                assert!(seen.insert(part), "partition {} assigned twice", part);
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[tokio::test]
    async fn test_append_not_visible_until_materialized() {
        let (cluster, platforms) = cluster_with(&[1]);
        let platform = &platforms[0];

        platform.append_record("orders", "A1", b"{}".to_vec()).await.unwrap();
        assert_eq!(cluster.pending_records(), 1);
        assert!(platform.open_local_view("orders-store").unwrap().get("A1").is_none());

        assert_eq!(cluster.materialize(), 1);
        assert_eq!(cluster.pending_records(), 0);
        let view = platform.open_local_view("orders-store").unwrap();
        assert_eq!(view.get("A1"), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_tombstone_removes_key() {
        let (cluster, platforms) = cluster_with(&[1]);
        let platform = &platforms[0];

        platform.append_record("orders", "A1", b"1".to_vec()).await.unwrap();
        cluster.materialize();
        platform.append_tombstone("orders", "A1").await.unwrap();
        cluster.materialize();

        let view = platform.open_local_view("orders-store").unwrap();
        assert!(view.get("A1").is_none());
        assert!(view.is_empty());
        assert_eq!(cluster.log("orders").len(), 2);
        assert_eq!(cluster.log("orders")[1].payload, None);
    }

    #[tokio::test]
    async fn test_records_land_only_on_owner() {
        let (cluster, platforms) = cluster_with(&[1, 2]);
        for i in 0..20 {
            platforms[0]
                .append_record("orders", &format!("k{}", i), vec![i as u8])
                .await
                .unwrap();
        }
        cluster.materialize();

        let total: usize = platforms
            .iter()
            .map(|p| p.open_local_view("orders-store").unwrap().len())
            .sum();
        assert_eq!(total, 20);

        for p in &platforms {
            let view = p.open_local_view("orders-store").unwrap();
            for (key, _) in view.scan() {
                assert_eq!(cluster.owner_of_key(&key).as_ref(), Some(p.local_host()));
            }
        }
    }

    #[tokio::test]
    async fn test_rebalance_makes_views_warm_up_and_rebuilds() {
        let (cluster, platforms) = cluster_with(&[1]);
        for i in 0..10 {
            platforms[0]
                .append_record("orders", &format!("k{}", i), vec![1])
                .await
                .unwrap();
        }
        cluster.materialize();

        let second = cluster.join(host(2));
        assert!(matches!(
            platforms[0].open_local_view("orders-store"),
            Err(QueryError::ViewNotReady { .. })
        ));

        cluster.materialize();
        let a = platforms[0].open_local_view("orders-store").unwrap().len();
        let b = second.open_local_view("orders-store").unwrap().len();
        assert_eq!(a + b, 10);
    }

    #[test]
    fn test_metadata_unavailable() {
        let (cluster, platforms) = cluster_with(&[1, 2]);
        cluster.set_metadata_available(false);

        assert_eq!(
            platforms[0].resolve_partition_owner("orders-store", "A1"),
            KeyOwner::NotAvailable
        );
        assert!(platforms[0].list_all_owners("orders-store").is_empty());

        cluster.set_metadata_available(true);
        assert!(matches!(
            platforms[0].resolve_partition_owner("orders-store", "A1"),
            KeyOwner::Active(_)
        ));
    }

    #[test]
    fn test_list_all_owners_reports_reachability() {
        let (cluster, platforms) = cluster_with(&[1, 2]);
        cluster.set_reachable(&host(2), false);

        let owners = platforms[0].list_all_owners("orders-store");
        assert_eq!(owners.len(), 2);
        let second = owners.iter().find(|o| o.host == host(2)).unwrap();
        assert!(!second.reachable);
        assert_eq!(second.partitions.len(), 3);
    }

    #[test]
    fn test_unknown_store() {
        let (_, platforms) = cluster_with(&[1]);
        assert!(matches!(
            platforms[0].open_local_view("nope"),
            Err(QueryError::UnknownStore(_))
        ));
        assert_eq!(
            platforms[0].resolve_partition_owner("nope", "A1"),
            KeyOwner::NotAvailable
        );
    }

    #[tokio::test]
    async fn test_snapshot_isolated_from_later_writes() {
        let (cluster, platforms) = cluster_with(&[1]);
        let snapshot = platforms[0].open_local_view("orders-store").unwrap();

        platforms[0].append_record("orders", "A1", vec![1]).await.unwrap();
        cluster.materialize();

        assert!(snapshot.get("A1").is_none());
        assert!(platforms[0]
            .open_local_view("orders-store")
            .unwrap()
            .get("A1")
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_materializer() {
        let (cluster, platforms) = cluster_with(&[1]);
        let handle = cluster.spawn_materializer(Duration::from_millis(50));

        platforms[0].append_record("orders", "A1", vec![1]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cluster.pending_records(), 0);
        handle.abort();
    }
}
