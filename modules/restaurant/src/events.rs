//! Reactions to rating events
//!
//! The rating service owns the average; this service keeps a copy in its
//! own `rating` column so search can order by it.

use async_trait::async_trait;
use event_bus::{
    EventEnvelope, EventPublisher, FailurePolicy, Reaction, ReactionError, ReactionHandler,
};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

use crate::repo::RestaurantRepo;

// ============================================================================
// RATING EVENTS
// ============================================================================

/// `rating.average.updated` data
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingAverage {
    #[serde(deserialize_with = "restaurant_id")]
    pub restaurant_id: i32,
    pub average_rating: f64,
}

/// Rating events this service understands
#[derive(Debug, Clone, PartialEq)]
pub enum RatingEvent {
    AverageUpdated(RatingAverage),
    Unrecognized(String),
}

impl RatingEvent {
    pub fn decode(envelope: &EventEnvelope) -> Result<Self, ReactionError> {
        match envelope.event_type.as_str() {
            "rating.average.updated" => envelope
                .decode_data()
                .map(RatingEvent::AverageUpdated)
                .map_err(|e| ReactionError::Permanent(format!("invalid rating average: {e}"))),
            other => Ok(RatingEvent::Unrecognized(other.to_string())),
        }
    }
}

/// Restaurants are keyed by integer; the id may arrive as a string
fn restaurant_id<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let raw = event_bus::string_or_number(d)?;
    raw.trim()
        .parse()
        .map_err(|_| serde::de::Error::custom(format!("restaurant id '{raw}' is not a valid id")))
}

// ============================================================================
// HANDLER
// ============================================================================

/// Copies the new average onto the restaurant and announces the change
///
/// Failure policy: [`FailurePolicy::NackRequeue`]. Setting a value twice
/// leaves the same row, so a redelivered event is harmless.
///
/// The last event handled wins. Averages from two concurrent ratings may
/// arrive in either order, so the stored value can lag the rating service
/// until the next rating for that restaurant.
pub struct RatingAverageHandler {
    repo: Arc<dyn RestaurantRepo>,
    publisher: EventPublisher,
}

impl RatingAverageHandler {
    pub fn new(repo: Arc<dyn RestaurantRepo>, publisher: EventPublisher) -> Self {
        Self { repo, publisher }
    }
}

#[async_trait]
impl ReactionHandler for RatingAverageHandler {
    fn name(&self) -> &'static str {
        "restaurant_rating_average"
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::NackRequeue
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<Reaction, ReactionError> {
        let average = match RatingEvent::decode(envelope)? {
            RatingEvent::AverageUpdated(average) => average,
            RatingEvent::Unrecognized(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring rating event");
                return Ok(Reaction::Ignored);
            }
        };

        let current = self
            .repo
            .find(average.restaurant_id)
            .await
            .map_err(|e| ReactionError::Transient(e.to_string()))?;

        let Some(current) = current else {
            tracing::warn!(
                restaurant_id = average.restaurant_id,
                "Rating average for unknown restaurant"
            );
            return Ok(Reaction::Ignored);
        };

        if (current.rating - average.average_rating).abs() < f64::EPSILON {
            return Ok(Reaction::Duplicate);
        }

        let updated = self
            .repo
            .set_rating(average.restaurant_id, average.average_rating)
            .await
            .map_err(|e| ReactionError::Transient(e.to_string()))?;

        match updated {
            Some(restaurant) => {
                tracing::info!(
                    restaurant_id = restaurant.id,
                    rating = restaurant.rating,
                    "Restaurant rating updated"
                );
                self.publisher.publish("restaurant.updated", &restaurant).await;
                Ok(Reaction::Applied)
            }
            None => Ok(Reaction::Ignored),
        }
    }
}
