//! Publishing upserts and tombstones to the backing topic.
//!
//! A publish returning `Ok` only means the platform accepted the record. The
//! local view picks it up later, when the platform materializes it.

use std::sync::Arc;

use serde::Serialize;

use crate::entity::{JsonSerializer, RecordSerializer, TombstoneSerializer};
use crate::error::{QueryError, Result};
use crate::platform::LogPlatform;

/// Placeholder handed to the tombstone serializer, which discards it.
const TOMBSTONE_PLACEHOLDER: &str = "tombstone";

/// Writes keyed records for one topic.
pub struct RecordPublisher {
    platform: Arc<dyn LogPlatform>,
    topic: String,
}

impl RecordPublisher {
    /// Creates a publisher for `topic`.
    pub fn new(platform: Arc<dyn LogPlatform>, topic: impl Into<String>) -> Self {
        Self {
            platform,
            topic: topic.into(),
        }
    }

    /// Topic this publisher writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes `value` under `key`, encoded by `serializer`.
    ///
    /// When the serializer yields no payload a tombstone is written instead.
    pub async fn publish<T, S>(&self, key: &str, value: &T, serializer: &S) -> Result<()>
    where
        T: ?Sized + Sync,
        S: RecordSerializer<T>,
    {
        let appended = match serializer.serialize(value)? {
            Some(payload) => {
                tracing::debug!(topic = %self.topic, key, bytes = payload.len(), "publishing record");
                self.platform.append_record(&self.topic, key, payload).await
            }
            None => {
                tracing::debug!(topic = %self.topic, key, "publishing tombstone");
                self.platform.append_tombstone(&self.topic, key).await
            }
        };

        appended.map_err(|e| match e {
            QueryError::PublishFailed { .. } => e,
            other => QueryError::PublishFailed {
                topic: self.topic.clone(),
                msg: other.to_string(),
            },
        })
    }

    /// Appends the full entity under `key`.
    pub async fn publish_upsert<T: Serialize + Sync>(&self, key: &str, entity: &T) -> Result<()> {
        self.publish(key, entity, &JsonSerializer).await
    }

    /// Appends a deletion marker for `key`.
    pub async fn publish_tombstone(&self, key: &str) -> Result<()> {
        self.publish(key, TOMBSTONE_PLACEHOLDER, &TombstoneSerializer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCluster;
    use crate::platform::HostInfo;

    #[derive(Serialize)]
    struct Item {
        id: String,
    }

    fn publisher() -> (Arc<MemoryCluster>, RecordPublisher) {
        let cluster = MemoryCluster::new(4).unwrap();
        cluster.register_store("items-store", "items");
        let platform = cluster.join(HostInfo::new("127.0.0.1", 1));
        cluster.materialize();
        (cluster, RecordPublisher::new(Arc::new(platform), "items"))
    }

    #[tokio::test]
    async fn test_upsert_carries_full_payload() {
        let (cluster, publisher) = publisher();
        publisher
            .publish_upsert("A1", &Item { id: "A1".to_string() })
            .await
            .unwrap();

        let log = cluster.log("items");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].key, "A1");
        assert_eq!(log[0].payload.as_deref(), Some(&br#"{"id":"A1"}"#[..]));
    }

    #[tokio::test]
    async fn test_tombstone_has_no_payload() {
        let (cluster, publisher) = publisher();
        publisher.publish_tombstone("A1").await.unwrap();

        let log = cluster.log("items");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].payload, None);
    }

    #[tokio::test]
    async fn test_tombstone_serializer_discards_any_value() {
        let (cluster, publisher) = publisher();
        publisher
            .publish("A1", &Item { id: "ignored".to_string() }, &TombstoneSerializer)
            .await
            .unwrap();

        assert_eq!(cluster.log("items")[0].payload, None);
    }

    #[tokio::test]
    async fn test_publish_does_not_touch_view() {
        let (cluster, publisher) = publisher();
        publisher
            .publish_upsert("A1", &Item { id: "A1".to_string() })
            .await
            .unwrap();

        assert_eq!(cluster.pending_records(), 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_publish_failure() {
        let (cluster, _) = publisher();
        let platform = cluster.platform(HostInfo::new("127.0.0.1", 1));
        let publisher = RecordPublisher::new(Arc::new(platform), "nope");

        assert!(matches!(
            publisher.publish_tombstone("A1").await,
            Err(QueryError::PublishFailed { .. })
        ));
    }
}
