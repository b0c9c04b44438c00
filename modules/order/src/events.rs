//! Reactions to delivery events
//!
//! The order service hears every `delivery.*` event. Order status is still
//! advanced through the HTTP API; delivery progress is only recorded here.

use async_trait::async_trait;
use event_bus::{EventEnvelope, FailurePolicy, Reaction, ReactionError, ReactionHandler};
use serde::Deserialize;

/// The part of a delivery event this service reads
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRef {
    /// Full deliveries carry `id`; location updates carry `deliveryId`
    #[serde(alias = "deliveryId")]
    pub id: String,
    #[serde(deserialize_with = "event_bus::string_or_number")]
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Everything `delivery.#` can carry
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    Created(DeliveryRef),
    Assigned(DeliveryRef),
    PickedUp(DeliveryRef),
    InTransit(DeliveryRef),
    Delivered(DeliveryRef),
    Failed(DeliveryRef),
    LocationUpdated(DeliveryRef),
    Unrecognized(String),
}

impl DeliveryEvent {
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, ReactionError> {
        let variant: fn(DeliveryRef) -> DeliveryEvent = match envelope.event_type.as_str() {
            "delivery.created" => DeliveryEvent::Created,
            "delivery.assigned" => DeliveryEvent::Assigned,
            "delivery.picked_up" => DeliveryEvent::PickedUp,
            "delivery.in_transit" => DeliveryEvent::InTransit,
            "delivery.delivered" => DeliveryEvent::Delivered,
            "delivery.failed" => DeliveryEvent::Failed,
            "delivery.location.updated" => DeliveryEvent::LocationUpdated,
            other => return Ok(DeliveryEvent::Unrecognized(other.to_string())),
        };

        envelope
            .decode_data()
            .map(variant)
            .map_err(|e| ReactionError::Permanent(format!("invalid delivery payload: {e}")))
    }

    pub fn delivery(&self) -> Option<&DeliveryRef> {
        match self {
            DeliveryEvent::Created(d)
            | DeliveryEvent::Assigned(d)
            | DeliveryEvent::PickedUp(d)
            | DeliveryEvent::InTransit(d)
            | DeliveryEvent::Delivered(d)
            | DeliveryEvent::Failed(d)
            | DeliveryEvent::LocationUpdated(d) => Some(d),
            DeliveryEvent::Unrecognized(_) => None,
        }
    }
}

/// Logs delivery progress against its order
///
/// Failure policy: [`FailurePolicy::AckAndDrop`]. Nothing is written, so a
/// lost event costs one log line.
pub struct DeliveryProgressHandler;

#[async_trait]
impl ReactionHandler for DeliveryProgressHandler {
    fn name(&self) -> &'static str {
        "order_delivery_progress"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::AckAndDrop
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<Reaction, ReactionError> {
        let event = DeliveryEvent::decode(envelope)?;

        let Some(delivery) = event.delivery() else {
            tracing::debug!(event_type = %envelope.event_type, "Ignoring delivery event");
            return Ok(Reaction::Ignored);
        };

        tracing::info!(
            event_type = %envelope.event_type,
            delivery_id = %delivery.id,
            order_id = %delivery.order_id,
            status = delivery.status.as_deref().unwrap_or("-"),
            "Delivery progress for order"
        );
        Ok(Reaction::Applied)
    }
}
