//! Order HTTP API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use platform_http_contracts::{ApiError, Data, DataList};
use serde_json::{json, Value};

use crate::models::{ListQuery, NewOrder, Order, OrderStatus, StatusUpdate};
use crate::AppState;

const NOT_FOUND: &str = "Order not found";

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<NewOrder>,
) -> Result<(StatusCode, Json<Data<Order>>), ApiError> {
    body.validate().map_err(ApiError::bad_request)?;

    let order = state
        .repo
        .create(&body)
        .await
        .map_err(|e| ApiError::internal("Failed to create order", &e))?;

    tracing::info!(
        order_id = order.id,
        user_id = %order.user_id,
        total_amount = order.total_amount,
        "Order created"
    );
    state.publisher.publish("order.created", &order).await;

    Ok((StatusCode::CREATED, Data::new(order)))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Data<Order>>, ApiError> {
    let order = state
        .repo
        .find(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch order", &e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Data::new(order))
}

/// GET /api/orders/user/{userId}
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListQuery>,
) -> Result<Json<DataList<Order>>, ApiError> {
    let orders = state
        .repo
        .list_for_user(&user_id, params.limit, params.offset)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch user orders", &e))?;

    Ok(DataList::new(orders))
}

/// PUT /api/orders/{id}/status
///
/// Publishes `order.{status}`; `order.ready` is what starts a delivery.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Data<Order>>, ApiError> {
    let status: OrderStatus = body.status.parse().map_err(ApiError::bad_request)?;

    let order = state
        .repo
        .set_status(id, status)
        .await
        .map_err(|e| ApiError::internal("Failed to update order status", &e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    tracing::info!(order_id = order.id, status = %status, "Order status updated");
    state.publisher.publish(&status.event_type(), &order).await;

    Ok(Data::new(order))
}

/// DELETE /api/orders/{id}
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let order = state
        .repo
        .cancel(id)
        .await
        .map_err(|e| ApiError::internal("Failed to cancel order", &e))?
        .ok_or_else(|| ApiError::not_found("Order not found or cannot be cancelled"))?;

    state.publisher.publish("order.cancelled", &order).await;

    Ok(Json(json!({
        "message": "Order cancelled successfully",
        "data": order
    })))
}
