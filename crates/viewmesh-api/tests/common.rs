//! Common test utilities: a fleet of API instances over one in-memory cluster.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use viewmesh_api::{OrderApi, ServerConfig, VehicleOrder};
use viewmesh_query::{HostInfo, MemoryCluster};

/// Fast retry budgets so failing verifications finish quickly.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        advertised_host: "127.0.0.1".to_string(),
        partitions: 12,
        remote_timeout_secs: 2,
        view_wait_attempts: 5,
        view_wait_delay_ms: 20,
        verify_attempts: 10,
        verify_delay_ms: 30,
        ..ServerConfig::default()
    }
}

/// One running instance.
pub struct TestInstance {
    pub host: HostInfo,
    pub base_url: String,
    pub api: Arc<OrderApi>,
    server: JoinHandle<()>,
}

impl TestInstance {
    /// Stops the HTTP server; the instance stays a partition owner.
    pub fn kill(&self) {
        self.server.abort();
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Instances sharing one cluster, each serving on an ephemeral port.
pub struct TestFleet {
    pub cluster: Arc<MemoryCluster>,
    pub instances: Vec<TestInstance>,
    pub http: reqwest::Client,
    materializer: JoinHandle<()>,
}

impl TestFleet {
    pub async fn start(size: usize) -> Self {
        let config = test_config();
        let cluster = MemoryCluster::new(config.partitions).unwrap();
        cluster.register_store(&config.store_name, &config.topic);

        let mut bound = Vec::new();
        for _ in 0..size {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let query = ServerConfig {
                advertised_port: port,
                ..config.clone()
            }
            .query_config(0);
            let platform = cluster.join(query.self_host());
            let api = Arc::new(OrderApi::new(&query, Arc::new(platform)).unwrap());
            bound.push((query.self_host(), api, listener));
        }
        cluster.materialize();
        let materializer = cluster.spawn_materializer(Duration::from_millis(10));

        let instances = bound
            .into_iter()
            .map(|(host, api, listener)| {
                let serving = Arc::clone(&api);
                let server = tokio::spawn(async move {
                    let _ = serving.serve(listener).await;
                });
                TestInstance {
                    base_url: format!("http://{}", host),
                    host,
                    api,
                    server,
                }
            })
            .collect();

        Self {
            cluster,
            instances,
            http: reqwest::Client::new(),
            materializer,
        }
    }

    /// Instance owning the partition of `key`.
    pub fn owner_of(&self, key: &str) -> &TestInstance {
        let owner = self.cluster.owner_of_key(key).unwrap();
        self.instances.iter().find(|i| i.host == owner).unwrap()
    }

    /// Any instance that does not own `key`.
    pub fn non_owner_of(&self, key: &str) -> &TestInstance {
        let owner = self.cluster.owner_of_key(key).unwrap();
        self.instances.iter().find(|i| i.host != owner).unwrap()
    }

    /// First key of the form `{prefix}-{n}` owned by `instance`.
    pub fn key_owned_by(&self, instance: &TestInstance, prefix: &str) -> String {
        (0..)
            .map(|n| format!("{}-{}", prefix, n))
            .find(|k| self.cluster.owner_of_key(k).as_ref() == Some(&instance.host))
            .unwrap()
    }

    /// Creates `order` through its owning instance and asserts it was confirmed.
    pub async fn create_on_owner(&self, order: &VehicleOrder) {
        let owner = self.owner_of(&order.order_number);
        let response = self
            .http
            .post(owner.url("/vehicleorder"))
            .json(order)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    }
}

impl Drop for TestFleet {
    fn drop(&mut self) {
        self.materializer.abort();
        for instance in &self.instances {
            instance.kill();
        }
    }
}
