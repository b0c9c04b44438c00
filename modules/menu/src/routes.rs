//! Menu HTTP API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use platform_http_contracts::{message, ApiError, Data, DataList};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{MenuCategory, MenuItem, MenuItemUpdate, MenuQuery, NewMenuItem};
use crate::repo::StoreError;
use crate::AppState;

const NOT_FOUND: &str = "Menu item not found";

fn store_error(context: &'static str) -> impl Fn(StoreError) -> ApiError {
    move |e| match e {
        StoreError::Invalid(reason) => ApiError::bad_request(reason),
        StoreError::Database(e) => ApiError::internal(context, &e),
    }
}

/// GET /api/menus/restaurant/{restaurantId}
pub async fn list_menu(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Query(params): Query<MenuQuery>,
) -> Result<Json<DataList<MenuItem>>, ApiError> {
    let category = params
        .category
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(str::parse::<MenuCategory>)
        .transpose()
        .map_err(ApiError::bad_request)?;

    let items = state
        .repo
        .list_for_restaurant(&restaurant_id, category, params.available())
        .await
        .map_err(store_error("Failed to fetch menu"))?;

    Ok(DataList::new(items))
}

/// GET /api/menus/{id}
pub async fn get_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Data<MenuItem>>, ApiError> {
    let item = state
        .repo
        .find(id)
        .await
        .map_err(store_error("Failed to fetch menu item"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Data::new(item))
}

/// POST /api/menus
pub async fn create_menu_item(
    State(state): State<AppState>,
    Json(body): Json<NewMenuItem>,
) -> Result<(StatusCode, Json<Data<MenuItem>>), ApiError> {
    let item = body
        .into_item(Uuid::new_v4(), Utc::now())
        .map_err(ApiError::bad_request)?;

    let item = state
        .repo
        .insert(&item)
        .await
        .map_err(store_error("Failed to create menu item"))?;

    tracing::info!(
        menu_item_id = %item.id,
        restaurant_id = %item.restaurant_id,
        "Menu item created"
    );
    state.publisher.publish("menu.item.created", &item).await;

    Ok((StatusCode::CREATED, Data::new(item)))
}

/// PUT /api/menus/{id}
pub async fn update_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MenuItemUpdate>,
) -> Result<Json<Data<MenuItem>>, ApiError> {
    body.validate().map_err(ApiError::bad_request)?;

    let item = state
        .repo
        .update(id, &body)
        .await
        .map_err(store_error("Failed to update menu item"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    state.publisher.publish("menu.item.updated", &item).await;

    Ok(Data::new(item))
}

/// DELETE /api/menus/{id}
pub async fn delete_menu_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .repo
        .delete(id)
        .await
        .map_err(store_error("Failed to delete menu item"))?;

    if !deleted {
        return Err(ApiError::not_found(NOT_FOUND));
    }

    state
        .publisher
        .publish("menu.item.deleted", &json!({ "id": id }))
        .await;

    Ok(message("Menu item deleted successfully"))
}
