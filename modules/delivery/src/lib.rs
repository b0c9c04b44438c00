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

use crate::repo::DeliveryRepo;

/// Shared by HTTP handlers and the order reaction
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn DeliveryRepo>,
    pub publisher: EventPublisher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/deliveries", post(routes::create_delivery))
        .route(
            "/api/deliveries/order/{order_id}",
            get(routes::get_delivery_by_order),
        )
        .route(
            "/api/deliveries/{id}",
            get(routes::get_delivery).put(routes::update_delivery),
        )
        .route("/api/deliveries/{id}/location", put(routes::update_location))
        .with_state(state)
}
