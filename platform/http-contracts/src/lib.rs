//! Shared HTTP response shapes for every food-delivery service
//!
//! - successes wrap the entity: `{ "data": ... }`, lists add `count`
//! - failures carry one message: `{ "error": "..." }`
//! - `GET /health` answers `{ status, service, version }`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

/// `{ "data": ... }`
#[derive(Debug, Clone, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T: Serialize> Data<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self { data })
    }
}

/// `{ "data": [...], "count": n }`
#[derive(Debug, Clone, Serialize)]
pub struct DataList<T> {
    pub data: Vec<T>,
    pub count: usize,
}

impl<T: Serialize> DataList<T> {
    pub fn new(data: Vec<T>) -> Json<Self> {
        let count = data.len();
        Json(Self { data, count })
    }
}

/// `{ "message": "..." }`, for deletes and other bodiless successes
pub fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An HTTP failure: status plus the message sent to the caller
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Log the cause, answer with a generic message
    pub fn internal(message: impl Into<String>, cause: &dyn std::fmt::Display) -> Self {
        let message = message.into();
        tracing::error!(error = %cause, "{}", message);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Health check payload
pub fn health(service: &str, version: &str) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": service,
        "version": version
    }))
}
