use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

/// A restaurant row; this is also the `data` of every `restaurant.*` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Restaurant {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub cuisine_type: Option<String>,
    pub opening_hours: Option<Json<Value>>,
    pub rating: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/restaurants`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRestaurant {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub address: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub cuisine_type: Option<String>,
    pub opening_hours: Option<Value>,
}

impl NewRestaurant {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if self.address.trim().is_empty() {
            return Err("address is required".to_string());
        }
        Ok(())
    }
}

/// Body of `PUT /api/restaurants/{id}`; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestaurantUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub cuisine_type: Option<String>,
    pub opening_hours: Option<Value>,
    pub is_active: Option<bool>,
}

impl RestaurantUpdate {
    pub fn apply(&self, restaurant: &mut Restaurant) {
        if let Some(name) = &self.name {
            restaurant.name = name.clone();
        }
        if let Some(description) = &self.description {
            restaurant.description = Some(description.clone());
        }
        if let Some(address) = &self.address {
            restaurant.address = address.clone();
        }
        if let Some(phone) = &self.phone {
            restaurant.phone = Some(phone.clone());
        }
        if let Some(email) = &self.email {
            restaurant.email = Some(email.clone());
        }
        if let Some(cuisine_type) = &self.cuisine_type {
            restaurant.cuisine_type = Some(cuisine_type.clone());
        }
        if let Some(opening_hours) = &self.opening_hours {
            restaurant.opening_hours = Some(Json(opening_hours.clone()));
        }
        if let Some(is_active) = self.is_active {
            restaurant.is_active = is_active;
        }
    }
}

/// `GET /api/restaurants` paging
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    10
}

/// `GET /api/restaurants/search` filters
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub cuisine_type: Option<String>,
}
