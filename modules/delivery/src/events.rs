//! Reactions to order events
//!
//! A ready order gets exactly one delivery. The order service announces
//! `order.ready`; this service creates the delivery and announces
//! `delivery.created` from its own exchange.

use async_trait::async_trait;
use event_bus::{
    EventEnvelope, EventPublisher, FailurePolicy, Reaction, ReactionError, ReactionHandler,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::Delivery;
use crate::repo::{CreateOutcome, DeliveryRepo};

/// Used when the order does not say where to pick up
pub const DEFAULT_RESTAURANT_ADDRESS: &str = "Restaurant Address";

// ============================================================================
// ORDER EVENTS
// ============================================================================

/// The fields of an order snapshot a delivery needs
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderSnapshot {
    #[serde(deserialize_with = "event_bus::string_or_number")]
    pub id: String,
    pub delivery_address: String,
    #[serde(default)]
    pub restaurant_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Ready(OrderSnapshot),
    Unrecognized(String),
}

impl OrderEvent {
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, ReactionError> {
        match envelope.event_type.as_str() {
            "order.ready" => envelope
                .decode_data()
                .map(OrderEvent::Ready)
                .map_err(|e| ReactionError::Permanent(format!("invalid order snapshot: {e}"))),
            other => Ok(OrderEvent::Unrecognized(other.to_string())),
        }
    }
}

// ============================================================================
// HANDLER
// ============================================================================

/// Creates the delivery for a ready order
///
/// Failure policy: [`FailurePolicy::NackRequeue`]. Creation is keyed on the
/// order id, so a redelivered `order.ready` finds the delivery and stops.
/// A `delivery.created` dropped because no channel was open is not sent
/// again on redelivery.
pub struct ReadyOrderHandler {
    repo: Arc<dyn DeliveryRepo>,
    publisher: EventPublisher,
}

impl ReadyOrderHandler {
    pub fn new(repo: Arc<dyn DeliveryRepo>, publisher: EventPublisher) -> Self {
        Self { repo, publisher }
    }
}

#[async_trait]
impl ReactionHandler for ReadyOrderHandler {
    fn name(&self) -> &'static str {
        "delivery_ready_order"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::NackRequeue
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<Reaction, ReactionError> {
        let order = match OrderEvent::decode(envelope)? {
            OrderEvent::Ready(order) => order,
            OrderEvent::Unrecognized(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring order event");
                return Ok(Reaction::Ignored);
            }
        };

        let delivery = Delivery::pending(
            order.id,
            order
                .restaurant_address
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RESTAURANT_ADDRESS.to_string()),
            order.delivery_address,
        );

        let outcome = self
            .repo
            .create_if_absent(&delivery)
            .await
            .map_err(|e| ReactionError::Transient(e.to_string()))?;

        match outcome {
            CreateOutcome::Created(delivery) => {
                tracing::info!(
                    delivery_id = %delivery.id,
                    order_id = %delivery.order_id,
                    "Auto-created delivery for ready order"
                );
                self.publisher.publish("delivery.created", &delivery).await;
                Ok(Reaction::Applied)
            }
            CreateOutcome::AlreadyExists(existing) => {
                tracing::info!(
                    delivery_id = %existing.id,
                    order_id = %existing.order_id,
                    "Delivery already exists for order"
                );
                Ok(Reaction::Duplicate)
            }
        }
    }
}
