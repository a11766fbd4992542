//! Calls to peer instances.
//!
//! Each peer exposes the same read surface for an entity type:
//! `GET /{entity_path}/{key}` and `GET /{entity_path}?local=true`.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::entity::Entity;
use crate::error::{QueryError, Result};

/// Read operations a peer instance answers for its local partitions.
#[async_trait]
pub trait RemoteEntityClient<V: Entity>: Send + Sync {
    /// Fetch one entity by key from the peer's local view.
    async fn get_entry(&self, key: &str) -> Result<Option<V>>;

    /// Fetch every entity in the peer's local view.
    async fn get_all_local(&self) -> Result<Vec<V>>;
}

/// HTTP/JSON peer client built on reqwest.
pub struct HttpEntityClient<V> {
    client: reqwest::Client,
    base: Url,
    entity_path: String,
    _entity: PhantomData<fn() -> V>,
}

impl<V: Entity> HttpEntityClient<V> {
    /// Creates a client for the peer at `base`. No connection is opened here.
    pub fn new(client: reqwest::Client, base: Url, entity_path: impl Into<String>) -> Self {
        Self {
            client,
            base,
            entity_path: entity_path.into().trim_matches('/').to_string(),
            _entity: PhantomData,
        }
    }

    /// Shared reqwest client with a per-request timeout.
    ///
    /// Falls back to reqwest defaults if the TLS backend cannot be initialized.
    pub fn http_client(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default()
    }

    /// Base URL of the peer.
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn collection_url(&self) -> Result<Url> {
        self.join(&self.entity_path)
    }

    fn entry_url(&self, key: &str) -> Result<Url> {
        let mut url = self.collection_url()?;
        url.path_segments_mut()
            .map_err(|_| QueryError::InvalidAddress {
                addr: self.base.to_string(),
                reason: "base URL cannot carry a path".to_string(),
            })?
            .push(key);
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| QueryError::InvalidAddress {
            addr: self.base.to_string(),
            reason: e.to_string(),
        })
    }
}

fn remote_failure(url: &Url, msg: impl ToString) -> QueryError {
    QueryError::RemoteCallFailed {
        url: url.to_string(),
        msg: msg.to_string(),
    }
}

#[async_trait]
impl<V: Entity> RemoteEntityClient<V> for HttpEntityClient<V> {
    async fn get_entry(&self, key: &str) -> Result<Option<V>> {
        let url = self.entry_url(key)?;
        tracing::debug!("fetching {} from peer", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| remote_failure(&url, e))?;

        match response.status() {
            StatusCode::OK => {
                let entity = response.json::<V>().await.map_err(|e| remote_failure(&url, e))?;
                Ok(Some(entity))
            }
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status => Err(remote_failure(&url, format!("HTTP {}", status))),
        }
    }

    async fn get_all_local(&self) -> Result<Vec<V>> {
        let mut url = self.collection_url()?;
        url.query_pairs_mut().append_pair("local", "true");
        tracing::debug!("fetching local entries from peer {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| remote_failure(&url, e))?;

        if !response.status().is_success() {
            return Err(remote_failure(&url, format!("HTTP {}", response.status())));
        }

        response
            .json::<Vec<V>>()
            .await
            .map_err(|e| remote_failure(&url, e))
    }
}
