//! Order persistence

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{NewOrder, Order, OrderStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait OrderRepo: Send + Sync {
    /// Insert with status and payment status `pending`; the total is computed here
    async fn create(&self, new: &NewOrder) -> Result<Order, StoreError>;

    async fn find(&self, id: i32) -> Result<Option<Order>, StoreError>;

    /// A user's orders, newest first
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, StoreError>;

    async fn set_status(&self, id: i32, status: OrderStatus) -> Result<Option<Order>, StoreError>;

    /// Cancel only while pending or confirmed; None when absent or too late
    async fn cancel(&self, id: i32) -> Result<Option<Order>, StoreError>;
}

pub struct PgOrderRepo {
    pool: PgPool,
}

impl PgOrderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepo for PgOrderRepo {
    async fn create(&self, new: &NewOrder) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (
                user_id, restaurant_id, items, total_amount, delivery_address,
                delivery_instructions, payment_method, status, payment_status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 'pending')
            RETURNING *
            "#,
        )
        .bind(&new.user_id)
        .bind(new.restaurant_id)
        .bind(Json(&new.items))
        .bind(new.total_amount())
        .bind(&new.delivery_address)
        .bind(&new.delivery_instructions)
        .bind(&new.payment_method)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find(&self, id: i32) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn set_status(&self, id: i32, status: OrderStatus) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
        )
        .bind(status)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn cancel(&self, id: i32) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'confirmed')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepo {
    rows: Mutex<Vec<Order>>,
}

impl InMemoryOrderRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, Vec<Order>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl OrderRepo for InMemoryOrderRepo {
    async fn create(&self, new: &NewOrder) -> Result<Order, StoreError> {
        let mut rows = self.rows();
        let now = Utc::now();
        let order = Order {
            id: rows.iter().map(|o| o.id).max().unwrap_or(0) + 1,
            user_id: new.user_id.clone(),
            restaurant_id: new.restaurant_id.unwrap_or_default(),
            items: Json(new.items.clone()),
            total_amount: new.total_amount(),
            delivery_address: new.delivery_address.clone(),
            delivery_instructions: new.delivery_instructions.clone(),
            status: OrderStatus::Pending,
            payment_status: "pending".to_string(),
            payment_method: new.payment_method.clone(),
            created_at: now,
            updated_at: now,
        };
        rows.push(order.clone());
        Ok(order)
    }

    async fn find(&self, id: i32) -> Result<Option<Order>, StoreError> {
        Ok(self.rows().iter().find(|o| o.id == id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, StoreError> {
        let mut rows: Vec<Order> = self
            .rows()
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn set_status(&self, id: i32, status: OrderStatus) -> Result<Option<Order>, StoreError> {
        let mut rows = self.rows();
        Ok(rows.iter_mut().find(|o| o.id == id).map(|order| {
            order.status = status;
            order.updated_at = Utc::now();
            order.clone()
        }))
    }

    async fn cancel(&self, id: i32) -> Result<Option<Order>, StoreError> {
        let mut rows = self.rows();
        Ok(rows
            .iter_mut()
            .find(|o| o.id == id && o.status.is_cancellable())
            .map(|order| {
                order.status = OrderStatus::Cancelled;
                order.updated_at = Utc::now();
                order.clone()
            }))
    }
}
