pub mod config;
pub mod db;
pub mod events;
pub mod health;
pub mod models;
pub mod repo;
pub mod routes;

use axum::{routing::get, Router};
use event_bus::EventPublisher;
use std::sync::Arc;

use crate::repo::RestaurantRepo;

/// Shared by HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn RestaurantRepo>,
    pub publisher: EventPublisher,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/restaurants",
            get(routes::list_restaurants).post(routes::create_restaurant),
        )
        .route("/api/restaurants/search", get(routes::search_restaurants))
        .route(
            "/api/restaurants/{id}",
            get(routes::get_restaurant)
                .put(routes::update_restaurant)
                .delete(routes::delete_restaurant),
        )
        .with_state(state)
}
