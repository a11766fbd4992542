//! HTTP routes for vehicle orders.

use crate::error::ApiError;
use crate::order::VehicleOrder;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use viewmesh_query::{
    ClientCache, Entity, EntityService, HostInfo, HttpEntityClient, LogPlatform, QueryConfig,
    Result as QueryResult,
};

/// Header echoing the entity key on write responses.
pub const KEY_HEADER: &str = "key";

/// Order service talking to peers over HTTP.
pub type OrderService = EntityService<VehicleOrder, HttpEntityClient<VehicleOrder>>;

/// Query string of the collection endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Only return entries held by the instance answering.
    pub local: bool,
}

/// REST endpoints for vehicle orders, also serving as the peer surface.
pub struct OrderApi {
    service: OrderService,
    entity_path: String,
}

impl OrderApi {
    /// Builds the service for `config`, with HTTP clients for peer calls.
    pub fn new(config: &QueryConfig, platform: Arc<dyn LogPlatform>) -> QueryResult<Self> {
        let entity_path = config.entity_path.trim_matches('/').to_string();
        let http = HttpEntityClient::<VehicleOrder>::http_client(config.remote_timeout());
        let peer_path = entity_path.clone();
        let clients = ClientCache::new(move |base: &Url| {
            HttpEntityClient::new(http.clone(), base.clone(), peer_path.clone())
        });

        Ok(Self {
            service: EntityService::new(config, platform, clients)?,
            entity_path,
        })
    }

    /// The entity service behind the routes.
    pub fn service(&self) -> &OrderService {
        &self.service
    }

    /// Address peers use to reach this instance.
    pub fn self_host(&self) -> &HostInfo {
        self.service.self_host()
    }

    /// Axum router with the health, collection and entry routes.
    pub fn router(self: Arc<Self>) -> Router {
        let collection = format!("/{}", self.entity_path);
        let entry = format!("/{}/:key", self.entity_path);

        Router::new()
            .route("/health", get(health_handler))
            .route(
                &collection,
                get(list_handler).post(create_handler).put(update_handler),
            )
            .route(&entry, get(get_handler).delete(delete_handler))
            .with_state(self)
    }

    /// Serves the routes on `listener` until the server stops.
    pub async fn serve(self: Arc<Self>, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!("order API for instance {} listening on {}", self.self_host(), addr);

        axum::serve(listener, self.router().into_make_service()).await?;
        Ok(())
    }

    /// Relative URL of the entry stored under `key`.
    fn location_of(&self, key: &str) -> Result<HeaderValue, ApiError> {
        let mut url = Url::parse("http://localhost/").map_err(|e| ApiError::InvalidEntity(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidEntity("cannot build entry path".to_string()))?
            .extend(self.entity_path.split('/'))
            .push(key);
        HeaderValue::from_str(url.path()).map_err(|e| ApiError::InvalidEntity(e.to_string()))
    }

    /// Checks the key before anything is published under it.
    fn write_headers(&self, order: &VehicleOrder) -> Result<(String, HeaderValue, HeaderValue), ApiError> {
        let key = order.key();
        if key.is_empty() {
            return Err(ApiError::InvalidEntity("orderNumber must not be empty".to_string()));
        }
        let key_value = HeaderValue::from_str(&key)
            .map_err(|_| ApiError::InvalidEntity(format!("orderNumber {:?} is not header-safe", key)))?;
        let location = self.location_of(&key)?;
        Ok((key, location, key_value))
    }
}

fn write_outcome(confirmed: bool, location: HeaderValue, key: HeaderValue) -> Response {
    if confirmed {
        (
            StatusCode::CREATED,
            [(header::LOCATION, location), (HeaderName::from_static(KEY_HEADER), key)],
        )
            .into_response()
    } else {
        (StatusCode::NOT_ACCEPTABLE, [(HeaderName::from_static(KEY_HEADER), key)]).into_response()
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn get_handler(
    State(api): State<Arc<OrderApi>>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    tracing::info!(key = %key, "get entry");
    match api.service.get_one(&key).await? {
        Some(order) => Ok(Json(order).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

async fn list_handler(
    State(api): State<Arc<OrderApi>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<VehicleOrder>>, ApiError> {
    let orders = api.service.get_all(params.local).await?;
    Ok(Json(orders))
}

async fn create_handler(
    State(api): State<Arc<OrderApi>>,
    Json(order): Json<VehicleOrder>,
) -> Result<Response, ApiError> {
    let (key, location, key_value) = api.write_headers(&order)?;
    tracing::info!(key = %key, "create entry");

    let confirmed = api.service.write_and_verify(&key, &order).await?;
    Ok(write_outcome(confirmed, location, key_value))
}

async fn update_handler(
    State(api): State<Arc<OrderApi>>,
    Json(order): Json<VehicleOrder>,
) -> Result<Response, ApiError> {
    let (key, location, key_value) = api.write_headers(&order)?;
    tracing::info!(key = %key, "update entry");

    let confirmed = api.service.update_and_verify(&order).await?;
    Ok(write_outcome(confirmed, location, key_value))
}

async fn delete_handler(
    State(api): State<Arc<OrderApi>>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    tracing::info!(key = %key, "delete entry");
    if api.service.delete_and_verify(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_ACCEPTABLE)
    }
}
