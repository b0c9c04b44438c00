//! API gateway
//!
//! Routes `/api/{restaurants,menus,orders,deliveries,ratings}` to the owning
//! service. The gateway holds no state of its own and never touches the
//! broker.

pub mod config;
pub mod proxy;

use axum::{
    extract::{Request, State},
    response::Response,
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ServiceRoute;
use crate::proxy::ProxyError;

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub routes: Arc<Vec<ServiceRoute>>,
}

impl AppState {
    pub fn new(client: reqwest::Client, routes: Vec<ServiceRoute>) -> Self {
        Self {
            client,
            routes: Arc::new(routes),
        }
    }

    fn route_for(&self, path: &str) -> Option<&ServiceRoute> {
        self.routes.iter().find(|r| r.matches(path))
    }
}

pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api", get(index));

    for route in state.routes.iter() {
        app = app
            .route(route.prefix, any(proxy))
            .route(&format!("{}/{{*path}}", route.prefix), any(proxy));
    }

    app.with_state(state)
}

async fn proxy(State(state): State<AppState>, request: Request) -> Result<Response, ProxyError> {
    let route = state
        .route_for(request.uri().path())
        .ok_or_else(|| ProxyError::Internal(format!("No service for {}", request.uri().path())))?;

    proxy::forward(&state.client, route, request).await
}

/// GET /health
async fn health() -> Json<Value> {
    platform_http_contracts::health("api-gateway", env!("CARGO_PKG_VERSION"))
}

/// GET /api
async fn index(State(state): State<AppState>) -> Json<Value> {
    let endpoints: serde_json::Map<String, Value> = state
        .routes
        .iter()
        .map(|r| (r.name.to_string(), Value::from(r.prefix)))
        .collect();

    Json(json!({
        "message": "Food Delivery API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints
    }))
}
