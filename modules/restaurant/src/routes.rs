//! Restaurant HTTP API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use platform_http_contracts::{message, ApiError, Data, DataList};
use serde_json::{json, Value};

use crate::models::{ListQuery, NewRestaurant, Restaurant, RestaurantUpdate, SearchQuery};
use crate::AppState;

const NOT_FOUND: &str = "Restaurant not found";

/// GET /api/restaurants
pub async fn list_restaurants(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<DataList<Restaurant>>, ApiError> {
    let rows = state
        .repo
        .list_active(params.limit, params.offset)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch restaurants", &e))?;

    Ok(DataList::new(rows))
}

/// GET /api/restaurants/search
pub async fn search_restaurants(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<DataList<Restaurant>>, ApiError> {
    let rows = state
        .repo
        .search(params.q.as_deref(), params.cuisine_type.as_deref())
        .await
        .map_err(|e| ApiError::internal("Failed to search restaurants", &e))?;

    Ok(DataList::new(rows))
}

/// GET /api/restaurants/{id}
pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Data<Restaurant>>, ApiError> {
    let restaurant = state
        .repo
        .find(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch restaurant", &e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Data::new(restaurant))
}

/// POST /api/restaurants
pub async fn create_restaurant(
    State(state): State<AppState>,
    Json(body): Json<NewRestaurant>,
) -> Result<(StatusCode, Json<Data<Restaurant>>), ApiError> {
    body.validate().map_err(ApiError::bad_request)?;

    let restaurant = state
        .repo
        .create(&body)
        .await
        .map_err(|e| ApiError::internal("Failed to create restaurant", &e))?;

    tracing::info!(restaurant_id = restaurant.id, "Restaurant created");
    state.publisher.publish("restaurant.created", &restaurant).await;

    Ok((StatusCode::CREATED, Data::new(restaurant)))
}

/// PUT /api/restaurants/{id}
pub async fn update_restaurant(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<RestaurantUpdate>,
) -> Result<Json<Data<Restaurant>>, ApiError> {
    let restaurant = state
        .repo
        .update(id, &body)
        .await
        .map_err(|e| ApiError::internal("Failed to update restaurant", &e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    state.publisher.publish("restaurant.updated", &restaurant).await;

    Ok(Data::new(restaurant))
}

/// DELETE /api/restaurants/{id}
///
/// Soft delete: the row stays, flagged inactive.
pub async fn delete_restaurant(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let found = state
        .repo
        .deactivate(id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete restaurant", &e))?;

    if !found {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    state
        .publisher
        .publish("restaurant.deleted", &json!({ "id": id }))
        .await;

    Ok(message("Restaurant deleted successfully"))
}
