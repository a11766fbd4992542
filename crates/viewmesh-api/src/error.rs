//! HTTP-facing errors.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use viewmesh_query::QueryError;

/// Errors returned by the order endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request carried an entity the API cannot store.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// The query core failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ApiError {
    /// Status code the error is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidEntity(_) => StatusCode::BAD_REQUEST,
            ApiError::Query(QueryError::ViewUnavailable { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Query(QueryError::RemoteCallFailed { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
