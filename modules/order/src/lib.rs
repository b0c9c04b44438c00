pub mod config;
pub mod db;
pub mod events;
pub mod health;
pub mod models;
pub mod repo;
pub mod routes;

use axum::{
    routing::{get, post, put},
    Router,
};
use event_bus::EventPublisher;
use std::sync::Arc;

use crate::repo::OrderRepo;

/// Shared by HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn OrderRepo>,
    pub publisher: EventPublisher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/orders", post(routes::create_order))
        .route("/api/orders/user/{user_id}", get(routes::list_user_orders))
        .route(
            "/api/orders/{id}",
            get(routes::get_order).delete(routes::cancel_order),
        )
        .route("/api/orders/{id}/status", put(routes::update_order_status))
        .with_state(state)
}
