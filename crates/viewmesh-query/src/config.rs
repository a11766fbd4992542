//! Settings the query core needs for one entity type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};
use crate::platform::HostInfo;
use crate::retry::RetryConfig;

/// Query core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Materialized store the view reads.
    pub store_name: String,
    /// Topic writes and deletes are published to.
    pub topic: String,
    /// Path segment peers serve the entity under.
    pub entity_path: String,
    /// Host this instance is reachable at by its peers.
    pub advertised_host: String,
    /// Port this instance is reachable at by its peers.
    pub advertised_port: u16,
    /// Per-request timeout for peer calls.
    pub remote_timeout_secs: u64,
    /// Cap on concurrent peer calls during "get all". Unbounded when unset.
    pub max_concurrent_fanout: Option<usize>,
    /// Attempts made while the local view warms up.
    pub view_wait_attempts: u32,
    /// Delay between view attempts.
    pub view_wait_delay_ms: u64,
    /// Attempts made to confirm a write or delete.
    pub verify_attempts: u32,
    /// Delay between confirmation attempts.
    pub verify_delay_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let wait = RetryConfig::view_wait();
        let verify = RetryConfig::verification();
        Self {
            store_name: String::from("vehicleorder-store"),
            topic: String::from("vehicleorder"),
            entity_path: String::from("vehicleorder"),
            advertised_host: String::from("localhost"),
            advertised_port: 8080,
            remote_timeout_secs: 10,
            max_concurrent_fanout: None,
            view_wait_attempts: wait.max_attempts,
            view_wait_delay_ms: wait.delay.as_millis() as u64,
            verify_attempts: verify.max_attempts,
            verify_delay_ms: verify.delay.as_millis() as u64,
        }
    }
}

impl QueryConfig {
    /// Advertised identity of this instance.
    pub fn self_host(&self) -> HostInfo {
        HostInfo::new(self.advertised_host.clone(), self.advertised_port)
    }

    /// Budget for waiting on a warming view.
    pub fn view_wait(&self) -> RetryConfig {
        RetryConfig::new(self.view_wait_attempts, self.view_wait_delay_ms)
    }

    /// Budget for confirming a write or delete.
    pub fn verification(&self) -> RetryConfig {
        RetryConfig::new(self.verify_attempts, self.verify_delay_ms)
    }

    /// Per-request timeout for peer calls.
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }

    /// Rejects settings the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store_name.is_empty() || self.topic.is_empty() {
            return Err(QueryError::InvalidConfig(
                "store_name and topic must be set".to_string(),
            ));
        }
        if self.entity_path.trim_matches('/').is_empty() {
            return Err(QueryError::InvalidConfig("entity_path must be set".to_string()));
        }
        if self.advertised_host.is_empty() {
            return Err(QueryError::InvalidConfig(
                "advertised_host must be set".to_string(),
            ));
        }
        if self.view_wait_attempts == 0 || self.verify_attempts == 0 {
            return Err(QueryError::InvalidConfig(
                "retry budgets need at least one attempt".to_string(),
            ));
        }
        if self.max_concurrent_fanout == Some(0) {
            return Err(QueryError::InvalidConfig(
                "max_concurrent_fanout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
