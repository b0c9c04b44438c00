//! Rating persistence

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Rating, RatingSort, RatingSummary};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The order was already rated
    #[error("Rating already exists for order {0}")]
    Conflict(String),
}

#[async_trait]
pub trait RatingRepo: Send + Sync {
    /// Insert; one rating per order
    async fn insert(&self, rating: &Rating) -> Result<Rating, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Rating>, StoreError>;

    /// One page of a restaurant's ratings plus the restaurant's total count
    async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        sort: RatingSort,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rating>, i64), StoreError>;

    /// A delivery's ratings, newest first
    async fn list_for_delivery(&self, delivery_id: &str) -> Result<Vec<Rating>, StoreError>;

    async fn summary(&self, restaurant_id: &str) -> Result<RatingSummary, StoreError>;
}

pub struct PgRatingRepo {
    pool: PgPool,
}

impl PgRatingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    total_ratings: i64,
    average: Option<f64>,
    food_quality: Option<f64>,
    delivery_rating: Option<f64>,
}

#[async_trait]
impl RatingRepo for PgRatingRepo {
    async fn insert(&self, rating: &Rating) -> Result<Rating, StoreError> {
        let result = sqlx::query_as::<_, Rating>(
            r#"
            INSERT INTO ratings (
                id, user_id, order_id, restaurant_id, delivery_id, restaurant_rating,
                delivery_rating, food_quality, delivery_speed, comment, images,
                is_verified, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(rating.id)
        .bind(&rating.user_id)
        .bind(&rating.order_id)
        .bind(&rating.restaurant_id)
        .bind(&rating.delivery_id)
        .bind(rating.restaurant_rating)
        .bind(rating.delivery_rating)
        .bind(rating.food_quality)
        .bind(rating.delivery_speed)
        .bind(&rating.comment)
        .bind(&rating.images)
        .bind(rating.is_verified)
        .bind(rating.created_at)
        .bind(rating.updated_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::Conflict(rating.order_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Rating>, StoreError> {
        let row = sqlx::query_as::<_, Rating>("SELECT * FROM ratings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        sort: RatingSort,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rating>, i64), StoreError> {
        let sql = format!(
            "SELECT * FROM ratings WHERE restaurant_id = $1 ORDER BY {} LIMIT $2 OFFSET $3",
            sort.order_by()
        );
        let rows = sqlx::query_as::<_, Rating>(&sql)
            .bind(restaurant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ratings WHERE restaurant_id = $1")
            .bind(restaurant_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total))
    }

    async fn list_for_delivery(&self, delivery_id: &str) -> Result<Vec<Rating>, StoreError> {
        let rows = sqlx::query_as::<_, Rating>(
            "SELECT * FROM ratings WHERE delivery_id = $1 ORDER BY created_at DESC",
        )
        .bind(delivery_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn summary(&self, restaurant_id: &str) -> Result<RatingSummary, StoreError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT COUNT(*) AS total_ratings,
                   AVG(restaurant_rating)::FLOAT8 AS average,
                   AVG(food_quality)::FLOAT8 AS food_quality,
                   AVG(delivery_rating)::FLOAT8 AS delivery_rating
            FROM ratings
            WHERE restaurant_id = $1
            "#,
        )
        .bind(restaurant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(RatingSummary::from_averages(
            row.total_ratings,
            row.average,
            row.food_quality,
            row.delivery_rating,
        ))
    }
}

/// Process-local store for tests
#[derive(Default)]
pub struct InMemoryRatingRepo {
    rows: Mutex<Vec<Rating>>,
}

impl InMemoryRatingRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<Rating>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RatingRepo for InMemoryRatingRepo {
    async fn insert(&self, rating: &Rating) -> Result<Rating, StoreError> {
        let mut rows = self.rows();
        if rows.iter().any(|r| r.order_id == rating.order_id) {
            return Err(StoreError::Conflict(rating.order_id.clone()));
        }
        rows.push(rating.clone());
        Ok(rating.clone())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Rating>, StoreError> {
        Ok(self.rows().iter().find(|r| r.id == id).cloned())
    }

    async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        sort: RatingSort,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Rating>, i64), StoreError> {
        let mut rows: Vec<Rating> = self
            .rows()
            .iter()
            .filter(|r| r.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        let total = rows.len() as i64;

        rows.sort_by(|a, b| sort.compare(a, b));
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_for_delivery(&self, delivery_id: &str) -> Result<Vec<Rating>, StoreError> {
        let mut rows: Vec<Rating> = self
            .rows()
            .iter()
            .filter(|r| r.delivery_id.as_deref() == Some(delivery_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| RatingSort::default().compare(a, b));
        Ok(rows)
    }

    async fn summary(&self, restaurant_id: &str) -> Result<RatingSummary, StoreError> {
        let rows: Vec<Rating> = self
            .rows()
            .iter()
            .filter(|r| r.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        Ok(RatingSummary::of(&rows))
    }
}
