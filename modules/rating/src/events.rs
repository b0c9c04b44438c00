//! Reactions to delivery events
//!
//! A delivered order can be rated. Nothing is stored yet; the handler marks
//! the point where a rating prompt would be sent.

use async_trait::async_trait;
use event_bus::{EventEnvelope, FailurePolicy, Reaction, ReactionError, ReactionHandler};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedDelivery {
    pub id: String,
    #[serde(deserialize_with = "event_bus::string_or_number")]
    pub order_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryEvent {
    Delivered(CompletedDelivery),
    Unrecognized(String),
}

impl DeliveryEvent {
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, ReactionError> {
        match envelope.event_type.as_str() {
            "delivery.delivered" => envelope
                .decode_data()
                .map(DeliveryEvent::Delivered)
                .map_err(|e| ReactionError::Permanent(format!("invalid delivery payload: {e}"))),
            other => Ok(DeliveryEvent::Unrecognized(other.to_string())),
        }
    }
}

/// Failure policy: [`FailurePolicy::AckAndDrop`]; there is no state to lose.
pub struct DeliveryCompletedHandler;

#[async_trait]
impl ReactionHandler for DeliveryCompletedHandler {
    fn name(&self) -> &'static str {
        "rating_delivery_completed"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::AckAndDrop
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<Reaction, ReactionError> {
        match DeliveryEvent::decode(envelope)? {
            DeliveryEvent::Delivered(delivery) => {
                tracing::info!(
                    delivery_id = %delivery.id,
                    order_id = %delivery.order_id,
                    "Delivery completed, order ready for rating"
                );
                Ok(Reaction::Applied)
            }
            DeliveryEvent::Unrecognized(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring delivery event");
                Ok(Reaction::Ignored)
            }
        }
    }
}
