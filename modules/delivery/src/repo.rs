//! Delivery persistence
//!
//! `order_id` is unique: one delivery per order, however many times the
//! `order.ready` event arrives.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Delivery, DeliveryStatus, DeliveryUpdate, Location};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid delivery: {0}")]
    Invalid(String),
}

/// Result of [`DeliveryRepo::create_if_absent`]
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Delivery),
    /// The order already had a delivery; this is the stored one
    AlreadyExists(Delivery),
}

/// A partial update together with the status it replaced
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeliveryChange {
    #[sqlx(flatten)]
    pub delivery: Delivery,
    pub previous_status: DeliveryStatus,
}

impl DeliveryChange {
    pub fn status_changed(&self) -> bool {
        self.delivery.status != self.previous_status
    }
}

#[async_trait]
pub trait DeliveryRepo: Send + Sync {
    /// Insert unless the order already has a delivery
    async fn create_if_absent(&self, delivery: &Delivery) -> Result<CreateOutcome, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<Delivery>, StoreError>;

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Delivery>, StoreError>;

    async fn update(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<DeliveryChange>, StoreError>;

    async fn set_location(
        &self,
        id: Uuid,
        location: &Location,
    ) -> Result<Option<Delivery>, StoreError>;
}

pub struct PgDeliveryRepo {
    pool: PgPool,
}

impl PgDeliveryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryRepo for PgDeliveryRepo {
    async fn create_if_absent(&self, delivery: &Delivery) -> Result<CreateOutcome, StoreError> {
        let inserted = sqlx::query_as::<_, Delivery>(
            r#"
            INSERT INTO deliveries (
                id, order_id, driver_id, driver_name, driver_phone, restaurant_address,
                delivery_address, status, estimated_time, actual_delivery_time,
                current_location, notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(delivery.id)
        .bind(&delivery.order_id)
        .bind(&delivery.driver_id)
        .bind(&delivery.driver_name)
        .bind(&delivery.driver_phone)
        .bind(&delivery.restaurant_address)
        .bind(&delivery.delivery_address)
        .bind(delivery.status)
        .bind(delivery.estimated_time)
        .bind(delivery.actual_delivery_time)
        .bind(&delivery.current_location)
        .bind(&delivery.notes)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = inserted {
            return Ok(CreateOutcome::Created(created));
        }

        // Deliveries are never deleted, so the conflicting row is still there
        let existing = self
            .find_by_order(&delivery.order_id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        Ok(CreateOutcome::AlreadyExists(existing))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query_as::<_, Delivery>("SELECT * FROM deliveries WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<DeliveryChange>, StoreError> {
        let status = update.status().map_err(StoreError::Invalid)?;

        // The self-join reads the row as it was before the update
        let row = sqlx::query_as::<_, DeliveryChange>(
            r#"
            UPDATE deliveries d
            SET driver_id = COALESCE($1, d.driver_id),
                driver_name = COALESCE($2, d.driver_name),
                driver_phone = COALESCE($3, d.driver_phone),
                restaurant_address = COALESCE($4, d.restaurant_address),
                delivery_address = COALESCE($5, d.delivery_address),
                status = COALESCE($6, d.status),
                estimated_time = COALESCE($7, d.estimated_time),
                notes = COALESCE($8, d.notes),
                actual_delivery_time = CASE
                    WHEN $6::delivery_status = 'delivered'
                        THEN COALESCE(d.actual_delivery_time, NOW())
                    ELSE d.actual_delivery_time
                END,
                updated_at = NOW()
            FROM (
                SELECT id, status AS previous_status
                FROM deliveries
                WHERE id = $9
                FOR UPDATE
            ) prev
            WHERE d.id = prev.id
            RETURNING d.*, prev.previous_status
            "#,
        )
        .bind(&update.driver_id)
        .bind(&update.driver_name)
        .bind(&update.driver_phone)
        .bind(&update.restaurant_address)
        .bind(&update.delivery_address)
        .bind(status)
        .bind(update.estimated_time)
        .bind(&update.notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn set_location(
        &self,
        id: Uuid,
        location: &Location,
    ) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query_as::<_, Delivery>(
            r#"
            UPDATE deliveries
            SET current_location = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(Json(location))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

/// Process-local store for tests
#[derive(Default)]
pub struct InMemoryDeliveryRepo {
    rows: Mutex<Vec<Delivery>>,
}

impl InMemoryDeliveryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<Delivery>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DeliveryRepo for InMemoryDeliveryRepo {
    async fn create_if_absent(&self, delivery: &Delivery) -> Result<CreateOutcome, StoreError> {
        let mut rows = self.rows();
        if let Some(existing) = rows.iter().find(|d| d.order_id == delivery.order_id) {
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }
        rows.push(delivery.clone());
        Ok(CreateOutcome::Created(delivery.clone()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Delivery>, StoreError> {
        Ok(self.rows().iter().find(|d| d.id == id).cloned())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Delivery>, StoreError> {
        Ok(self.rows().iter().find(|d| d.order_id == order_id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Option<DeliveryChange>, StoreError> {
        let mut rows = self.rows();
        let Some(delivery) = rows.iter_mut().find(|d| d.id == id) else {
            return Ok(None);
        };
        let previous_status = delivery.status;
        update
            .apply(delivery, Utc::now())
            .map_err(StoreError::Invalid)?;
        Ok(Some(DeliveryChange {
            delivery: delivery.clone(),
            previous_status,
        }))
    }

    async fn set_location(
        &self,
        id: Uuid,
        location: &Location,
    ) -> Result<Option<Delivery>, StoreError> {
        let mut rows = self.rows();
        Ok(rows.iter_mut().find(|d| d.id == id).map(|delivery| {
            delivery.current_location = Some(Json(location.clone()));
            delivery.updated_at = Utc::now();
            delivery.clone()
        }))
    }
}
