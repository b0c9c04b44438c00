use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Delivery status enum matching database delivery_status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::PickedUp => "picked_up",
            DeliveryStatus::InTransit => "in_transit",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn event_type(self) -> String {
        format!("delivery.{}", self.as_str())
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "assigned" => Ok(DeliveryStatus::Assigned),
            "picked_up" => Ok(DeliveryStatus::PickedUp),
            "in_transit" => Ok(DeliveryStatus::InTransit),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!(
                "status '{other}' must be one of pending, assigned, picked_up, in_transit, delivered, failed"
            )),
        }
    }
}

/// Last reported driver position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub last_updated: DateTime<Utc>,
}

/// A delivery row; also the `data` of `delivery.created` and every status event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: String,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub restaurant_address: String,
    pub delivery_address: String,
    pub status: DeliveryStatus,
    /// Minutes
    pub estimated_time: i32,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub current_location: Option<Json<Location>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// A fresh `pending` delivery for an order
    pub fn pending(order_id: String, restaurant_address: String, delivery_address: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            driver_id: None,
            driver_name: None,
            driver_phone: None,
            restaurant_address,
            delivery_address,
            status: DeliveryStatus::Pending,
            estimated_time: 30,
            actual_delivery_time: None,
            current_location: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body of `POST /api/deliveries`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDelivery {
    #[serde(default)]
    pub order_id: String,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    #[serde(default)]
    pub restaurant_address: String,
    #[serde(default)]
    pub delivery_address: String,
    pub status: Option<String>,
    pub estimated_time: Option<i32>,
    pub notes: Option<String>,
}

impl NewDelivery {
    pub fn into_delivery(self) -> Result<Delivery, String> {
        if self.order_id.trim().is_empty() {
            return Err("orderId is required".to_string());
        }
        if self.restaurant_address.trim().is_empty() {
            return Err("restaurantAddress is required".to_string());
        }
        if self.delivery_address.trim().is_empty() {
            return Err("deliveryAddress is required".to_string());
        }
        let status = self
            .status
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or(DeliveryStatus::Pending);

        let mut delivery =
            Delivery::pending(self.order_id, self.restaurant_address, self.delivery_address);
        delivery.driver_id = self.driver_id;
        delivery.driver_name = self.driver_name;
        delivery.driver_phone = self.driver_phone;
        delivery.status = status;
        delivery.estimated_time = self.estimated_time.unwrap_or(30);
        delivery.notes = self.notes;
        if status == DeliveryStatus::Delivered {
            delivery.actual_delivery_time = Some(delivery.created_at);
        }
        Ok(delivery)
    }
}

/// Body of `PUT /api/deliveries/{id}`; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUpdate {
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub restaurant_address: Option<String>,
    pub delivery_address: Option<String>,
    pub status: Option<String>,
    pub estimated_time: Option<i32>,
    pub notes: Option<String>,
}

impl DeliveryUpdate {
    pub fn status(&self) -> Result<Option<DeliveryStatus>, String> {
        self.status.as_deref().map(str::parse).transpose()
    }

    /// Apply in place; moving into `delivered` stamps the delivery time once
    pub fn apply(&self, delivery: &mut Delivery, now: DateTime<Utc>) -> Result<(), String> {
        let status = self.status()?;
        if let Some(driver_id) = &self.driver_id {
            delivery.driver_id = Some(driver_id.clone());
        }
        if let Some(driver_name) = &self.driver_name {
            delivery.driver_name = Some(driver_name.clone());
        }
        if let Some(driver_phone) = &self.driver_phone {
            delivery.driver_phone = Some(driver_phone.clone());
        }
        if let Some(restaurant_address) = &self.restaurant_address {
            delivery.restaurant_address = restaurant_address.clone();
        }
        if let Some(delivery_address) = &self.delivery_address {
            delivery.delivery_address = delivery_address.clone();
        }
        if let Some(estimated_time) = self.estimated_time {
            delivery.estimated_time = estimated_time;
        }
        if let Some(notes) = &self.notes {
            delivery.notes = Some(notes.clone());
        }
        if let Some(status) = status {
            delivery.status = status;
            if status == DeliveryStatus::Delivered && delivery.actual_delivery_time.is_none() {
                delivery.actual_delivery_time = Some(now);
            }
        }
        delivery.updated_at = now;
        Ok(())
    }
}

/// Body of `PUT /api/deliveries/{id}/location`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationUpdate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl LocationUpdate {
    pub fn into_location(self, now: DateTime<Utc>) -> Result<Location, String> {
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Err("latitude and longitude are required".to_string());
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err("latitude or longitude out of range".to_string());
        }
        Ok(Location {
            latitude,
            longitude,
            last_updated: now,
        })
    }
}
