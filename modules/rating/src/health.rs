use axum::Json;
use serde_json::Value;

/// Health check endpoint handler
pub async fn health() -> Json<Value> {
    platform_http_contracts::health("rating-service", env!("CARGO_PKG_VERSION"))
}
