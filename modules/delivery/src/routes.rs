//! Delivery HTTP API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use platform_http_contracts::{ApiError, Data};
use serde_json::json;
use uuid::Uuid;

use crate::models::{Delivery, DeliveryUpdate, LocationUpdate, NewDelivery};
use crate::repo::{CreateOutcome, StoreError};
use crate::AppState;

const NOT_FOUND: &str = "Delivery not found";

fn store_error(context: &'static str) -> impl Fn(StoreError) -> ApiError {
    move |e| match e {
        StoreError::Invalid(reason) => ApiError::bad_request(reason),
        StoreError::Database(e) => ApiError::internal(context, &e),
    }
}

/// POST /api/deliveries
pub async fn create_delivery(
    State(state): State<AppState>,
    Json(body): Json<NewDelivery>,
) -> Result<(StatusCode, Json<Data<Delivery>>), ApiError> {
    let delivery = body.into_delivery().map_err(ApiError::bad_request)?;

    let outcome = state
        .repo
        .create_if_absent(&delivery)
        .await
        .map_err(store_error("Failed to create delivery"))?;

    match outcome {
        CreateOutcome::Created(delivery) => {
            tracing::info!(
                delivery_id = %delivery.id,
                order_id = %delivery.order_id,
                "Delivery created"
            );
            state.publisher.publish("delivery.created", &delivery).await;
            Ok((StatusCode::CREATED, Data::new(delivery)))
        }
        CreateOutcome::AlreadyExists(_) => Err(ApiError::conflict(
            "Delivery already exists for this order",
        )),
    }
}

/// GET /api/deliveries/{id}
pub async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Data<Delivery>>, ApiError> {
    let delivery = state
        .repo
        .find(id)
        .await
        .map_err(store_error("Failed to fetch delivery"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Data::new(delivery))
}

/// GET /api/deliveries/order/{orderId}
pub async fn get_delivery_by_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Data<Delivery>>, ApiError> {
    let delivery = state
        .repo
        .find_by_order(&order_id)
        .await
        .map_err(store_error("Failed to fetch delivery"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    Ok(Data::new(delivery))
}

/// PUT /api/deliveries/{id}
///
/// A status change publishes `delivery.{status}` with the updated delivery.
pub async fn update_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DeliveryUpdate>,
) -> Result<Json<Data<Delivery>>, ApiError> {
    body.status().map_err(ApiError::bad_request)?;

    let change = state
        .repo
        .update(id, &body)
        .await
        .map_err(store_error("Failed to update delivery"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    if change.status_changed() {
        let status = change.delivery.status;
        tracing::info!(
            delivery_id = %id,
            from = %change.previous_status,
            to = %status,
            "Delivery status changed"
        );
        state
            .publisher
            .publish(&status.event_type(), &change.delivery)
            .await;
    }

    Ok(Data::new(change.delivery))
}

/// PUT /api/deliveries/{id}/location
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<LocationUpdate>,
) -> Result<Json<Data<Delivery>>, ApiError> {
    let location = body
        .into_location(Utc::now())
        .map_err(ApiError::bad_request)?;

    let delivery = state
        .repo
        .set_location(id, &location)
        .await
        .map_err(store_error("Failed to update location"))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;

    state
        .publisher
        .publish(
            "delivery.location.updated",
            &json!({
                "deliveryId": id,
                "orderId": delivery.order_id,
                "location": {
                    "latitude": location.latitude,
                    "longitude": location.longitude
                }
            }),
        )
        .await;

    Ok(Data::new(delivery))
}
