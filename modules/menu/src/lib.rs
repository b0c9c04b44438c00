pub mod config;
pub mod db;
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

use crate::repo::MenuRepo;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn MenuRepo>,
    pub publisher: EventPublisher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/menus", post(routes::create_menu_item))
        .route(
            "/api/menus/restaurant/{restaurant_id}",
            get(routes::list_menu),
        )
        .route(
            "/api/menus/{id}",
            get(routes::get_menu_item)
                .put(routes::update_menu_item)
                .delete(routes::delete_menu_item),
        )
        .with_state(state)
}
