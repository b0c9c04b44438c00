//! Rating HTTP API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use platform_http_contracts::{ApiError, Data, DataList};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{NewRating, Rating, RatingPage, RatingSort, RestaurantRatingsQuery};
use crate::repo::StoreError;
use crate::AppState;

/// POST /api/ratings
///
/// Publishes `rating.created`, then `rating.average.updated` with the
/// restaurant's new average.
pub async fn create_rating(
    State(state): State<AppState>,
    Json(body): Json<NewRating>,
) -> Result<(StatusCode, Json<Data<Rating>>), ApiError> {
    let rating = body
        .into_rating(Uuid::new_v4(), Utc::now())
        .map_err(ApiError::bad_request)?;

    let rating = state.repo.insert(&rating).await.map_err(|e| match e {
        StoreError::Conflict(_) => ApiError::conflict("Rating already exists for this order"),
        e => ApiError::internal("Failed to create rating", &e),
    })?;

    tracing::info!(
        rating_id = %rating.id,
        restaurant_id = %rating.restaurant_id,
        "Rating created"
    );
    state.publisher.publish("rating.created", &rating).await;

    // The rating is stored; a failed recompute only costs the announcement
    match state.repo.summary(&rating.restaurant_id).await {
        Ok(summary) => {
            state
                .publisher
                .publish(
                    "rating.average.updated",
                    &json!({
                        "restaurantId": rating.restaurant_id,
                        "averageRating": summary.average
                    }),
                )
                .await;
        }
        Err(e) => tracing::error!(
            restaurant_id = %rating.restaurant_id,
            error = %e,
            "Failed to compute average rating"
        ),
    }

    Ok((StatusCode::CREATED, Data::new(rating)))
}

/// GET /api/ratings/{id}
pub async fn get_rating(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Data<Rating>>, ApiError> {
    let rating = state
        .repo
        .find(id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch rating", &e))?
        .ok_or_else(|| ApiError::not_found("Rating not found"))?;

    Ok(Data::new(rating))
}

/// GET /api/ratings/restaurant/{restaurantId}
pub async fn list_restaurant_ratings(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Query(params): Query<RestaurantRatingsQuery>,
) -> Result<Json<RatingPage>, ApiError> {
    let sort = match params.sort.as_deref() {
        Some(raw) if !raw.is_empty() => RatingSort::parse(raw).map_err(ApiError::bad_request)?,
        _ => RatingSort::default(),
    };

    let (data, total) = state
        .repo
        .list_for_restaurant(&restaurant_id, sort, params.limit, params.offset)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch ratings", &e))?;

    Ok(Json(RatingPage {
        count: data.len(),
        data,
        total,
    }))
}

/// GET /api/ratings/delivery/{deliveryId}
pub async fn list_delivery_ratings(
    State(state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<DataList<Rating>>, ApiError> {
    let ratings = state
        .repo
        .list_for_delivery(&delivery_id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch ratings", &e))?;

    Ok(DataList::new(ratings))
}

/// GET /api/ratings/restaurant/{restaurantId}/average
pub async fn restaurant_average(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let summary = state
        .repo
        .summary(&restaurant_id)
        .await
        .map_err(|e| ApiError::internal("Failed to calculate average rating", &e))?;

    Ok(Json(json!({
        "data": {
            "restaurantId": restaurant_id,
            "averageRating": summary
        }
    })))
}
