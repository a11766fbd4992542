//! Error types for the interactive-query core.

use thiserror::Error;

/// Errors raised while routing, reading or publishing entities.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The platform reports the local view as not yet initialized or mid-rebalance.
    #[error("local view {store} is not ready")]
    ViewNotReady {
        /// Name of the materialized store.
        store: String,
    },

    /// The local view stayed unqueryable for the whole wait budget.
    #[error("local view {store} unavailable after {attempts} attempts")]
    ViewUnavailable {
        /// Name of the materialized store.
        store: String,
        /// Number of acquisition attempts made.
        attempts: u32,
    },

    /// Partition ownership metadata for the key has not converged.
    #[error("no owner available for key '{key}' in store {store}")]
    NoOwnerAvailable {
        /// Name of the materialized store.
        store: String,
        /// Key that could not be resolved.
        key: String,
    },

    /// A peer instance call failed or timed out.
    #[error("remote call to {url} failed: {msg}")]
    RemoteCallFailed {
        /// Target URL of the failed call.
        url: String,
        /// Description of the failure.
        msg: String,
    },

    /// A host could not be turned into a well-formed base URL.
    #[error("invalid peer address {addr}: {reason}")]
    InvalidAddress {
        /// The offending `host:port` string.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// The local view does not yet reflect a published write or delete.
    #[error("key '{key}' not yet in expected state")]
    NotYetVisible {
        /// Key being verified.
        key: String,
    },

    /// Appending to the log failed.
    #[error("publish to topic {topic} failed: {msg}")]
    PublishFailed {
        /// Target topic.
        topic: String,
        /// Description of the failure.
        msg: String,
    },

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The named store or topic is not registered with the platform.
    #[error("unknown store or topic: {0}")]
    UnknownStore(String),

    /// Entity payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for the query core.
pub type Result<T> = std::result::Result<T, QueryError>;
