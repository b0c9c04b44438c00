//! Restaurant persistence

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{NewRestaurant, Restaurant, RestaurantUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait RestaurantRepo: Send + Sync {
    /// Active restaurants, newest first
    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<Restaurant>, StoreError>;

    /// Active restaurants matching `q` in name or description (case-insensitive)
    /// and `cuisine_type` exactly, best rated first
    async fn search(
        &self,
        q: Option<&str>,
        cuisine_type: Option<&str>,
    ) -> Result<Vec<Restaurant>, StoreError>;

    async fn find(&self, id: i32) -> Result<Option<Restaurant>, StoreError>;

    async fn create(&self, new: &NewRestaurant) -> Result<Restaurant, StoreError>;

    async fn update(
        &self,
        id: i32,
        update: &RestaurantUpdate,
    ) -> Result<Option<Restaurant>, StoreError>;

    /// Soft delete; returns false when the restaurant does not exist
    async fn deactivate(&self, id: i32) -> Result<bool, StoreError>;

    async fn set_rating(&self, id: i32, rating: f64) -> Result<Option<Restaurant>, StoreError>;
}

pub struct PgRestaurantRepo {
    pool: PgPool,
}

impl PgRestaurantRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RestaurantRepo for PgRestaurantRepo {
    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<Restaurant>, StoreError> {
        let rows = sqlx::query_as::<_, Restaurant>(
            r#"
            SELECT * FROM restaurants
            WHERE is_active = TRUE
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn search(
        &self,
        q: Option<&str>,
        cuisine_type: Option<&str>,
    ) -> Result<Vec<Restaurant>, StoreError> {
        let pattern = q.filter(|q| !q.is_empty()).map(|q| format!("%{q}%"));

        let rows = sqlx::query_as::<_, Restaurant>(
            r#"
            SELECT * FROM restaurants
            WHERE is_active = TRUE
              AND ($1::TEXT IS NULL OR name ILIKE $1 OR description ILIKE $1)
              AND ($2::TEXT IS NULL OR cuisine_type = $2)
            ORDER BY rating DESC, name ASC
            "#,
        )
        .bind(pattern)
        .bind(cuisine_type.filter(|c| !c.is_empty()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find(&self, id: i32) -> Result<Option<Restaurant>, StoreError> {
        let row = sqlx::query_as::<_, Restaurant>("SELECT * FROM restaurants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn create(&self, new: &NewRestaurant) -> Result<Restaurant, StoreError> {
        let row = sqlx::query_as::<_, Restaurant>(
            r#"
            INSERT INTO restaurants
                (name, description, address, phone, email, cuisine_type, opening_hours)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.address)
        .bind(&new.phone)
        .bind(&new.email)
        .bind(&new.cuisine_type)
        .bind(new.opening_hours.clone().map(Json))
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update(
        &self,
        id: i32,
        update: &RestaurantUpdate,
    ) -> Result<Option<Restaurant>, StoreError> {
        let row = sqlx::query_as::<_, Restaurant>(
            r#"
            UPDATE restaurants
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                address = COALESCE($3, address),
                phone = COALESCE($4, phone),
                email = COALESCE($5, email),
                cuisine_type = COALESCE($6, cuisine_type),
                opening_hours = COALESCE($7, opening_hours),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(&update.name)
        .bind(&update.description)
        .bind(&update.address)
        .bind(&update.phone)
        .bind(&update.email)
        .bind(&update.cuisine_type)
        .bind(update.opening_hours.clone().map(Json))
        .bind(update.is_active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn deactivate(&self, id: i32) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE restaurants SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_rating(&self, id: i32, rating: f64) -> Result<Option<Restaurant>, StoreError> {
        let row = sqlx::query_as::<_, Restaurant>(
            "UPDATE restaurants SET rating = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(rating)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Process-local store for tests and `BUS_TYPE=inmemory` demos
#[derive(Default)]
pub struct InMemoryRestaurantRepo {
    rows: Mutex<Vec<Restaurant>>,
}

impl InMemoryRestaurantRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<Restaurant>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RestaurantRepo for InMemoryRestaurantRepo {
    async fn list_active(&self, limit: i64, offset: i64) -> Result<Vec<Restaurant>, StoreError> {
        let mut rows: Vec<Restaurant> = self.rows().iter().filter(|r| r.is_active).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn search(
        &self,
        q: Option<&str>,
        cuisine_type: Option<&str>,
    ) -> Result<Vec<Restaurant>, StoreError> {
        let q = q.filter(|q| !q.is_empty()).map(str::to_lowercase);
        let cuisine_type = cuisine_type.filter(|c| !c.is_empty());

        let mut rows: Vec<Restaurant> = self
            .rows()
            .iter()
            .filter(|r| r.is_active)
            .filter(|r| match &q {
                Some(q) => {
                    r.name.to_lowercase().contains(q)
                        || r.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(q))
                }
                None => true,
            })
            .filter(|r| cuisine_type.is_none() || r.cuisine_type.as_deref() == cuisine_type)
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.rating.total_cmp(&a.rating).then_with(|| a.name.cmp(&b.name)));
        Ok(rows)
    }

    async fn find(&self, id: i32) -> Result<Option<Restaurant>, StoreError> {
        Ok(self.rows().iter().find(|r| r.id == id).cloned())
    }

    async fn create(&self, new: &NewRestaurant) -> Result<Restaurant, StoreError> {
        let mut rows = self.rows();
        let now = Utc::now();
        let restaurant = Restaurant {
            id: rows.iter().map(|r| r.id).max().unwrap_or(0) + 1,
            name: new.name.clone(),
            description: new.description.clone(),
            address: new.address.clone(),
            phone: new.phone.clone(),
            email: new.email.clone(),
            cuisine_type: new.cuisine_type.clone(),
            opening_hours: new.opening_hours.clone().map(Json),
            rating: 0.0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        rows.push(restaurant.clone());
        Ok(restaurant)
    }

    async fn update(
        &self,
        id: i32,
        update: &RestaurantUpdate,
    ) -> Result<Option<Restaurant>, StoreError> {
        let mut rows = self.rows();
        Ok(rows.iter_mut().find(|r| r.id == id).map(|restaurant| {
            update.apply(restaurant);
            restaurant.updated_at = Utc::now();
            restaurant.clone()
        }))
    }

    async fn deactivate(&self, id: i32) -> Result<bool, StoreError> {
        let mut rows = self.rows();
        match rows.iter_mut().find(|r| r.id == id) {
            Some(restaurant) => {
                restaurant.is_active = false;
                restaurant.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_rating(&self, id: i32, rating: f64) -> Result<Option<Restaurant>, StoreError> {
        let mut rows = self.rows();
        Ok(rows.iter_mut().find(|r| r.id == id).map(|restaurant| {
            restaurant.rating = rating;
            restaurant.updated_at = Utc::now();
            restaurant.clone()
        }))
    }
}
