//! Menu item persistence

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{MenuCategory, MenuItem, MenuItemUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid menu item: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait MenuRepo: Send + Sync {
    /// A restaurant's menu, ordered by category then name
    async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        category: Option<MenuCategory>,
        available: Option<bool>,
    ) -> Result<Vec<MenuItem>, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<MenuItem>, StoreError>;

    async fn insert(&self, item: &MenuItem) -> Result<MenuItem, StoreError>;

    async fn update(&self, id: Uuid, update: &MenuItemUpdate)
        -> Result<Option<MenuItem>, StoreError>;

    /// Hard delete; returns false when nothing was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

pub struct PgMenuRepo {
    pool: PgPool,
}

impl PgMenuRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MenuRepo for PgMenuRepo {
    async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        category: Option<MenuCategory>,
        available: Option<bool>,
    ) -> Result<Vec<MenuItem>, StoreError> {
        let rows = sqlx::query_as::<_, MenuItem>(
            r#"
            SELECT * FROM menu_items
            WHERE restaurant_id = $1
              AND ($2::menu_category IS NULL OR category = $2)
              AND ($3::BOOLEAN IS NULL OR is_available = $3)
            ORDER BY category::TEXT ASC, name ASC
            "#,
        )
        .bind(restaurant_id)
        .bind(category)
        .bind(available)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> Result<Option<MenuItem>, StoreError> {
        let row = sqlx::query_as::<_, MenuItem>("SELECT * FROM menu_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn insert(&self, item: &MenuItem) -> Result<MenuItem, StoreError> {
        let row = sqlx::query_as::<_, MenuItem>(
            r#"
            INSERT INTO menu_items (
                id, restaurant_id, name, description, category, price, image_url,
                is_available, is_vegetarian, is_vegan, allergens, preparation_time,
                calories, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(item.id)
        .bind(&item.restaurant_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.category)
        .bind(item.price)
        .bind(&item.image_url)
        .bind(item.is_available)
        .bind(item.is_vegetarian)
        .bind(item.is_vegan)
        .bind(&item.allergens)
        .bind(item.preparation_time)
        .bind(item.calories)
        .bind(item.created_at)
        .bind(item.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn update(
        &self,
        id: Uuid,
        update: &MenuItemUpdate,
    ) -> Result<Option<MenuItem>, StoreError> {
        let category = update.category().map_err(StoreError::Invalid)?;
        update.validate().map_err(StoreError::Invalid)?;

        let row = sqlx::query_as::<_, MenuItem>(
            r#"
            UPDATE menu_items
            SET name = COALESCE($1, name),
                description = COALESCE($2, description),
                category = COALESCE($3, category),
                price = COALESCE($4, price),
                image_url = COALESCE($5, image_url),
                is_available = COALESCE($6, is_available),
                is_vegetarian = COALESCE($7, is_vegetarian),
                is_vegan = COALESCE($8, is_vegan),
                allergens = COALESCE($9, allergens),
                preparation_time = COALESCE($10, preparation_time),
                calories = COALESCE($11, calories),
                updated_at = NOW()
            WHERE id = $12
            RETURNING *
            "#,
        )
        .bind(&update.name)
        .bind(&update.description)
        .bind(category)
        .bind(update.price)
        .bind(&update.image_url)
        .bind(update.is_available)
        .bind(update.is_vegetarian)
        .bind(update.is_vegan)
        .bind(&update.allergens)
        .bind(update.preparation_time)
        .bind(update.calories)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM menu_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Process-local store for tests
#[derive(Default)]
pub struct InMemoryMenuRepo {
    items: Mutex<Vec<MenuItem>>,
}

impl InMemoryMenuRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, Vec<MenuItem>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MenuRepo for InMemoryMenuRepo {
    async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
        category: Option<MenuCategory>,
        available: Option<bool>,
    ) -> Result<Vec<MenuItem>, StoreError> {
        let mut items: Vec<MenuItem> = self
            .items()
            .iter()
            .filter(|i| i.restaurant_id == restaurant_id)
            .filter(|i| category.map_or(true, |c| i.category == c))
            .filter(|i| available.map_or(true, |a| i.is_available == a))
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            a.category
                .as_str()
                .cmp(b.category.as_str())
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(items)
    }

    async fn find(&self, id: Uuid) -> Result<Option<MenuItem>, StoreError> {
        Ok(self.items().iter().find(|i| i.id == id).cloned())
    }

    async fn insert(&self, item: &MenuItem) -> Result<MenuItem, StoreError> {
        self.items().push(item.clone());
        Ok(item.clone())
    }

    async fn update(
        &self,
        id: Uuid,
        update: &MenuItemUpdate,
    ) -> Result<Option<MenuItem>, StoreError> {
        let mut items = self.items();
        let Some(item) = items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        update.apply(item).map_err(StoreError::Invalid)?;
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut items = self.items();
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() < before)
    }
}
