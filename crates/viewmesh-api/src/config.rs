//! Server configuration, loaded from TOML or JSON.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use viewmesh_query::QueryConfig;

use crate::order::ENTITY_PATH;

/// Settings of the `vmesh serve` process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address of the first instance.
    pub bind_addr: SocketAddr,
    /// Host peers use to reach this process.
    pub advertised_host: String,
    /// Port peers use to reach the first instance.
    pub advertised_port: u16,
    /// Path segment the order routes are mounted under.
    pub entity_path: String,
    /// Log topic orders are published to.
    pub topic: String,
    /// Materialized view over the topic.
    pub store_name: String,
    /// Partition count of the topic.
    pub partitions: u32,
    /// Number of instances the standalone server runs in-process, on consecutive ports.
    pub instances: u16,
    /// How often the in-process log is folded into the views.
    pub materialize_interval_ms: u64,
    /// Timeout of one peer call.
    pub remote_timeout_secs: u64,
    /// Cap on concurrent peer calls during "get all".
    pub max_concurrent_fanout: Option<usize>,
    /// Attempts to acquire a view that is still warming up.
    pub view_wait_attempts: u32,
    /// Delay between view acquisition attempts.
    pub view_wait_delay_ms: u64,
    /// Attempts to confirm a write or delete.
    pub verify_attempts: u32,
    /// Delay between confirmation attempts.
    pub verify_delay_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let query = QueryConfig::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            advertised_host: String::from("localhost"),
            advertised_port: 8080,
            entity_path: String::from(ENTITY_PATH),
            topic: String::from("vehicleorder"),
            store_name: String::from("vehicleorder-store"),
            partitions: 6,
            instances: 1,
            materialize_interval_ms: 100,
            remote_timeout_secs: query.remote_timeout_secs,
            max_concurrent_fanout: None,
            view_wait_attempts: query.view_wait_attempts,
            view_wait_delay_ms: query.view_wait_delay_ms,
            verify_attempts: query.verify_attempts,
            verify_delay_ms: query.verify_delay_ms,
        }
    }
}

impl ServerConfig {
    /// Loads a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ServerConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ServerConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Core settings for the instance at `offset` among the in-process instances.
    pub fn query_config(&self, offset: u16) -> QueryConfig {
        QueryConfig {
            store_name: self.store_name.clone(),
            topic: self.topic.clone(),
            entity_path: self.entity_path.clone(),
            advertised_host: self.advertised_host.clone(),
            advertised_port: self.advertised_port.saturating_add(offset),
            remote_timeout_secs: self.remote_timeout_secs,
            max_concurrent_fanout: self.max_concurrent_fanout,
            view_wait_attempts: self.view_wait_attempts,
            view_wait_delay_ms: self.view_wait_delay_ms,
            verify_attempts: self.verify_attempts,
            verify_delay_ms: self.verify_delay_ms,
        }
    }

    /// Listen address of the instance at `offset`.
    pub fn bind_addr_for(&self, offset: u16) -> SocketAddr {
        let mut addr = self.bind_addr;
        addr.set_port(addr.port().saturating_add(offset));
        addr
    }
}
