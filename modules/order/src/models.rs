use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;

/// Order lifecycle status matching database order_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Routing key announcing a move into this status
    pub fn event_type(self) -> String {
        format!("order.{}", self.as_str())
    }

    /// Whether a customer may still cancel
    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "preparing" => Ok(OrderStatus::Preparing),
            "ready" => Ok(OrderStatus::Ready),
            "picked_up" => Ok(OrderStatus::PickedUp),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err("Invalid status".to_string()),
        }
    }
}

/// One line of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu_item_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

/// An order row; also the `data` of every `order.*` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i32,
    pub user_id: String,
    pub restaurant_id: i32,
    pub items: Json<Vec<OrderItem>>,
    pub total_amount: f64,
    pub delivery_address: String,
    pub delivery_instructions: Option<String>,
    pub status: OrderStatus,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/orders`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub user_id: String,
    pub restaurant_id: Option<i32>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub delivery_address: String,
    pub delivery_instructions: Option<String>,
    pub payment_method: Option<String>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user_id is required".to_string());
        }
        if self.restaurant_id.is_none() {
            return Err("restaurant_id is required".to_string());
        }
        if self.items.is_empty() {
            return Err("items must not be empty".to_string());
        }
        for item in &self.items {
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(format!("item '{}' has an invalid price", item.name));
            }
            if item.quantity == 0 {
                return Err(format!("item '{}' must have a quantity of at least 1", item.name));
            }
        }
        if self.delivery_address.trim().is_empty() {
            return Err("delivery_address is required".to_string());
        }
        Ok(())
    }

    /// Sum of price × quantity over every line
    pub fn total_amount(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.price * f64::from(item.quantity))
            .sum()
    }
}

/// Body of `PUT /api/orders/{id}/status`
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: String,
}

/// `GET /api/orders/user/{userId}` paging
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(body: serde_json::Value) -> NewOrder {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_total_is_price_times_quantity() {
        let new = order(json!({
            "user_id": "u1",
            "restaurant_id": 1,
            "delivery_address": "2 Side St",
            "items": [
                {"menu_item_id": "m1", "name": "Pizza", "price": 10.0, "quantity": 2},
                {"menu_item_id": "m2", "name": "Cola", "price": 2.5, "quantity": 1}
            ]
        }));

        assert!(new.validate().is_ok());
        assert_eq!(new.total_amount(), 22.5);
    }

    #[test]
    fn test_rejects_empty_items_and_zero_quantity() {
        let empty = order(json!({"user_id": "u1", "restaurant_id": 1, "delivery_address": "x"}));
        assert_eq!(empty.validate().unwrap_err(), "items must not be empty");

        let zero = order(json!({
            "user_id": "u1", "restaurant_id": 1, "delivery_address": "x",
            "items": [{"menu_item_id": "m1", "name": "Pizza", "price": 10.0, "quantity": 0}]
        }));
        assert!(zero.validate().unwrap_err().contains("quantity"));
    }

    #[test]
    fn test_status_parsing_and_event_type() {
        assert_eq!("picked_up".parse::<OrderStatus>().unwrap(), OrderStatus::PickedUp);
        assert_eq!("shipped".parse::<OrderStatus>().unwrap_err(), "Invalid status");
        assert_eq!(OrderStatus::Ready.event_type(), "order.ready");
        assert!(OrderStatus::Confirmed.is_cancellable());
        assert!(!OrderStatus::Preparing.is_cancellable());
    }
}
