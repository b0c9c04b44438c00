pub mod config;
pub mod db;
pub mod events;
pub mod health;
pub mod models;
pub mod repo;
pub mod routes;

use axum::{
    routing::{get, post},
    Router,
};
use event_bus::EventPublisher;
use std::sync::Arc;

use crate::repo::RatingRepo;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn RatingRepo>,
    pub publisher: EventPublisher,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/ratings", post(routes::create_rating))
        .route(
            "/api/ratings/restaurant/{restaurant_id}",
            get(routes::list_restaurant_ratings),
        )
        .route(
            "/api/ratings/restaurant/{restaurant_id}/average",
            get(routes::restaurant_average),
        )
        .route(
            "/api/ratings/delivery/{delivery_id}",
            get(routes::list_delivery_ratings),
        )
        .route("/api/ratings/{id}", get(routes::get_rating))
        .with_state(state)
}
