#![warn(missing_docs)]

//! ViewMesh query core: interactive queries over log-materialized views
//! partitioned across a fleet of service instances.
//!
//! Each instance materializes the partitions it owns into a local view. Reads
//! are served locally or forwarded to the owning peer, "get all" reads are
//! scattered to every owner, and writes are published to the log and then
//! confirmed by polling the local view.

pub mod client_cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod memory;
pub mod ownership;
pub mod partitioner;
pub mod platform;
pub mod publisher;
pub mod remote;
pub mod retry;
pub mod router;
pub mod service;
pub mod verifier;
pub mod view;

pub use client_cache::ClientCache;
pub use config::QueryConfig;
pub use entity::Entity;
pub use error::{QueryError, Result};
pub use memory::{MemoryCluster, MemoryPlatform};
pub use platform::{HostInfo, LogPlatform};
pub use remote::{HttpEntityClient, RemoteEntityClient};
pub use service::EntityService;
pub use verifier::Verification;
