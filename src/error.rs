use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not permitted: {0}")]
    Permission(String),

    #[error("conflict: {0}")]
    StateConflict(String),

    #[error("no available drivers")]
    NoAvailableDrivers,

    #[error("dependency unavailable: {0}")]
    Dependency(String),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DispatchError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DispatchError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DispatchError::Permission(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            DispatchError::StateConflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            DispatchError::NoAvailableDrivers => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no available drivers".to_string(),
            ),
            DispatchError::Dependency(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
