//! Lazily built, reused clients for peer instances.
//!
//! One client per distinct `host:port`, created on first use and kept for the
//! life of the process. The set of peers is bounded by the fleet size, so
//! entries are never evicted.

use std::net::Ipv6Addr;
use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Url;

use crate::error::{QueryError, Result};
use crate::platform::HostInfo;

type ClientBuilder<C> = dyn Fn(&Url) -> C + Send + Sync;

/// Cache of peer clients keyed by base URL.
pub struct ClientCache<C> {
    clients: DashMap<String, Arc<C>>,
    builder: Arc<ClientBuilder<C>>,
}

impl<C: Send + Sync + 'static> ClientCache<C> {
    /// Creates an empty cache that builds clients with `builder`.
    ///
    /// The builder must not perform network I/O; connections are made on first use.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(&Url) -> C + Send + Sync + 'static,
    {
        Self {
            clients: DashMap::new(),
            builder: Arc::new(builder),
        }
    }

    /// Client for `host`, built on first request and reused afterwards.
    ///
    /// Fails with [`QueryError::InvalidAddress`] if the host does not form a
    /// well-formed base URL. That is a configuration error and is not retried.
    pub fn client_for(&self, host: &HostInfo) -> Result<Arc<C>> {
        let url = base_url(host)?;
        let key = url.as_str().to_string();

        if let Some(client) = self.clients.get(&key) {
            return Ok(Arc::clone(client.value()));
        }

        let client = self
            .clients
            .entry(key)
            .or_insert_with(|| {
                tracing::info!("creating peer client for {}", url);
                Arc::new((self.builder)(&url))
            })
            .clone();
        Ok(client)
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no client has been built yet.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// `http://host:port/` for a peer instance.
///
/// IPv6 literals are bracketed, so `::1` becomes `http://[::1]:port/`.
pub fn base_url(host: &HostInfo) -> Result<Url> {
    let ipv6 = host.host.parse::<Ipv6Addr>().ok();
    let raw = match ipv6 {
        Some(_) => format!("http://[{}]:{}", host.host, host.port),
        None => format!("http://{}:{}", host.host, host.port),
    };
    let url = Url::parse(&raw).map_err(|e| QueryError::InvalidAddress {
        addr: host.to_string(),
        reason: e.to_string(),
    })?;

    // Url::parse happily reads "a/b" as host plus path and "u@h" as userinfo plus host.
    let expected = match ipv6 {
        Some(addr) => format!("[{}]", addr),
        None => host.host.clone(),
    };
    let host_matches = url
        .host_str()
        .map_or(false, |h| h.eq_ignore_ascii_case(&expected));
    if !host_matches || url.path() != "/" || url.port_or_known_default() != Some(host.port) {
        return Err(QueryError::InvalidAddress {
            addr: host.to_string(),
            reason: "host must be a bare hostname or IP address".to_string(),
        });
    }
    Ok(url)
}
