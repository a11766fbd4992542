//! The operations an endpoint layer calls for one entity type.
//!
//! Reads go through the [`QueryRouter`]. Writes and deletes are published to
//! the log and then confirmed against the local view; the boolean result only
//! says whether that confirmation succeeded, never whether the record landed.

use std::sync::Arc;

use crate::client_cache::ClientCache;
use crate::config::QueryConfig;
use crate::entity::Entity;
use crate::error::Result;
use crate::ownership::OwnershipResolver;
use crate::platform::{HostInfo, LogPlatform};
use crate::publisher::RecordPublisher;
use crate::remote::RemoteEntityClient;
use crate::router::QueryRouter;
use crate::verifier::ConsistencyVerifier;
use crate::view::ViewAccessor;

/// Router, publisher and verifier wired together for one entity type.
pub struct EntityService<V, C> {
    router: QueryRouter<V, C>,
    publisher: RecordPublisher,
    verifier: ConsistencyVerifier<V>,
}

impl<V, C> EntityService<V, C>
where
    V: Entity,
    C: RemoteEntityClient<V> + 'static,
{
    /// Builds the service from `config` on top of `platform`.
    pub fn new(config: &QueryConfig, platform: Arc<dyn LogPlatform>, clients: ClientCache<C>) -> Result<Self> {
        config.validate()?;

        let view = Arc::new(ViewAccessor::new(
            Arc::clone(&platform),
            config.store_name.clone(),
            config.view_wait(),
        ));
        let resolver = OwnershipResolver::new(
            Arc::clone(&platform),
            config.store_name.clone(),
            config.self_host(),
        );

        tracing::info!(
            store = %config.store_name,
            topic = %config.topic,
            host = %config.self_host(),
            "entity service ready"
        );

        Ok(Self {
            router: QueryRouter::new(resolver, Arc::clone(&view), clients, config.max_concurrent_fanout),
            publisher: RecordPublisher::new(platform, config.topic.clone()),
            verifier: ConsistencyVerifier::new(view, config.verification()),
        })
    }

    /// This instance's advertised identity.
    pub fn self_host(&self) -> &HostInfo {
        self.router.resolver().self_host()
    }

    /// The underlying router.
    pub fn router(&self) -> &QueryRouter<V, C> {
        &self.router
    }

    /// Entity under `key` from whichever instance owns it.
    pub async fn get_one(&self, key: &str) -> Result<Option<V>> {
        self.router.get_one(key).await
    }

    /// Every entity, from this instance only or from the whole fleet.
    pub async fn get_all(&self, local_only: bool) -> Result<Vec<V>> {
        self.router.get_all(local_only).await
    }

    /// Publishes `entity` under `key` and waits for the local view to show it.
    ///
    /// `Ok(false)` means the record was published but not observed in time.
    pub async fn write_and_verify(&self, key: &str, entity: &V) -> Result<bool> {
        self.publisher.publish_upsert(key, entity).await?;
        Ok(self.verifier.verify_upsert_visible(key, entity).await.is_confirmed())
    }

    /// Publishes a tombstone for `key` and waits for the local view to drop it.
    pub async fn delete_and_verify(&self, key: &str) -> Result<bool> {
        self.publisher.publish_tombstone(key).await?;
        Ok(self.verifier.verify_delete_visible(key).await.is_confirmed())
    }

    /// Replaces the entity stored under its key.
    ///
    /// Deletes the key, confirms the deletion, then writes and confirms the
    /// new value. Stops after the delete if it was not confirmed.
    pub async fn update_and_verify(&self, entity: &V) -> Result<bool> {
        let key = entity.key();
        if !self.delete_and_verify(&key).await? {
            tracing::warn!(key = %key, "update aborted, previous entry still visible");
            return Ok(false);
        }
        self.write_and_verify(&key, entity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::memory::MemoryCluster;
    use crate::remote::HttpEntityClient;
    use reqwest::Url;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        rev: u32,
    }

    impl Entity for Item {
        fn key(&self) -> String {
            self.id.clone()
        }
    }

    fn item(id: &str, rev: u32) -> Item {
        Item {
            id: id.to_string(),
            rev,
        }
    }

    type Service = EntityService<Item, HttpEntityClient<Item>>;

    fn config() -> QueryConfig {
        QueryConfig {
            store_name: "items-store".to_string(),
            topic: "items".to_string(),
            entity_path: "items".to_string(),
            advertised_host: "127.0.0.1".to_string(),
            advertised_port: 7001,
            ..QueryConfig::default()
        }
    }

    fn service(cluster: &Arc<MemoryCluster>, config: &QueryConfig) -> Service {
        let platform = cluster.join(config.self_host());
        cluster.materialize();
        let clients = ClientCache::new(|url: &Url| {
            HttpEntityClient::new(reqwest::Client::new(), url.clone(), "items")
        });
        EntityService::new(config, Arc::new(platform), clients).unwrap()
    }

    fn cluster() -> Arc<MemoryCluster> {
        let cluster = MemoryCluster::new(4).unwrap();
        cluster.register_store("items-store", "items");
        cluster
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_your_writes() {
        let cluster = cluster();
        let svc = service(&cluster, &config());
        let _materializer = cluster.spawn_materializer(Duration::from_millis(50));

        assert!(svc.write_and_verify("A1", &item("A1", 1)).await.unwrap());
        assert_eq!(svc.get_one("A1").await.unwrap(), Some(item("A1", 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_without_materialization_is_unconfirmed() {
        let cluster = cluster();
        let svc = service(&cluster, &config());

        assert!(!svc.write_and_verify("A1", &item("A1", 1)).await.unwrap());
        // the record stands even though confirmation failed
        assert_eq!(cluster.log("items").len(), 1);
        cluster.materialize();
        assert_eq!(svc.get_one("A1").await.unwrap(), Some(item("A1", 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_then_absent() {
        let cluster = cluster();
        let svc = service(&cluster, &config());
        let _materializer = cluster.spawn_materializer(Duration::from_millis(50));

        assert!(svc.write_and_verify("A1", &item("A1", 1)).await.unwrap());
        assert!(svc.delete_and_verify("A1").await.unwrap());
        assert_eq!(svc.get_one("A1").await.unwrap(), None);
        assert!(svc.get_all(true).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_replaces_entity() {
        let cluster = cluster();
        let svc = service(&cluster, &config());
        let _materializer = cluster.spawn_materializer(Duration::from_millis(50));

        assert!(svc.write_and_verify("A1", &item("A1", 1)).await.unwrap());
        assert!(svc.update_and_verify(&item("A1", 2)).await.unwrap());
        assert_eq!(svc.get_one("A1").await.unwrap(), Some(item("A1", 2)));

        let log = cluster.log("items");
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].payload, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_stops_when_delete_unconfirmed() {
        let cluster = cluster();
        let svc = service(&cluster, &config());
        svc.write_and_verify("A1", &item("A1", 1)).await.unwrap();
        cluster.materialize();

        assert!(!svc.update_and_verify(&item("A1", 2)).await.unwrap());
        // only the tombstone was appended after the original write
        assert_eq!(cluster.log("items").len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let cluster = cluster();
        let platform = cluster.join(HostInfo::new("127.0.0.1", 7001));
        let bad = QueryConfig {
            verify_attempts: 0,
            ..config()
        };
        let clients = ClientCache::new(|url: &Url| {
            HttpEntityClient::<Item>::new(reqwest::Client::new(), url.clone(), "items")
        });

        assert!(matches!(
            EntityService::<Item, _>::new(&bad, Arc::new(platform), clients),
            Err(QueryError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_failure_is_an_error() {
        let cluster = cluster();
        let wrong_topic = QueryConfig {
            topic: "unregistered".to_string(),
            ..config()
        };
        let svc = service(&cluster, &wrong_topic);

        assert!(matches!(
            svc.write_and_verify("A1", &item("A1", 1)).await,
            Err(QueryError::PublishFailed { .. })
        ));
    }
}
