//! Reaction handlers and the dispatch step that settles each delivery
//!
//! A handler sees decoded envelopes only. Dispatch owns the broker side:
//! it decodes, runs the handler (retrying transient failures), and then
//! acks or rejects exactly once.

use async_trait::async_trait;
use tracing::Instrument;

use crate::consumer_retry::{retry_if, RetryConfig};
use crate::{validate_envelope_fields, Delivery, EventEnvelope};

/// What a handler did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// The handler acted on the event
    Applied,
    /// The effect was already present; nothing changed
    Duplicate,
    /// The event type is not one this handler acts on
    Ignored,
}

#[derive(Debug, thiserror::Error)]
pub enum ReactionError {
    /// The event can never be applied (bad payload, violated invariant)
    #[error("permanent: {0}")]
    Permanent(String),

    /// The event may apply later (store unavailable, lock timeout)
    #[error("transient: {0}")]
    Transient(String),
}

impl ReactionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReactionError::Transient(_))
    }
}

/// What to do with a delivery whose transient failure outlived its retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Acknowledge and log; the event is lost for this consumer
    AckAndDrop,
    /// Reject with requeue; the broker hands it out again
    ///
    /// Only for handlers whose reaction is idempotent.
    NackRequeue,
}

/// A consumer's local reaction to events arriving on one queue
#[async_trait]
pub trait ReactionHandler: Send + Sync {
    /// Used in logs and as the retry context
    fn name(&self) -> &'static str;

    fn failure_policy(&self) -> FailurePolicy;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<Reaction, ReactionError>;
}

/// How dispatch settled a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Acked,
    Requeued,
    Discarded,
}

/// Parse a delivery body, checking the envelope fields before typing it
fn decode(payload: &[u8]) -> Result<EventEnvelope, String> {
    let raw: serde_json::Value = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    validate_envelope_fields(&raw)?;
    serde_json::from_value(raw).map_err(|e| e.to_string())
}

/// Run `handler` on one delivery and settle it with the broker
pub(crate) async fn dispatch(
    handler: &dyn ReactionHandler,
    delivery: Delivery,
    retry: &RetryConfig,
) -> Settlement {
    let envelope = match decode(&delivery.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Requeueing a body that cannot be decoded would loop forever
            tracing::error!(
                handler = handler.name(),
                exchange = %delivery.exchange,
                routing_key = %delivery.routing_key,
                error = %e,
                "Malformed message, rejecting without requeue"
            );
            settle(&delivery, Settlement::Discarded).await;
            return Settlement::Discarded;
        }
    };

    let span = tracing::info_span!(
        "reaction",
        handler = handler.name(),
        event_type = %envelope.event_type,
        service = %envelope.service,
        routing_key = %delivery.routing_key,
        redelivered = delivery.redelivered,
    );

    async {
        let result = retry_if(
            || handler.handle(&envelope),
            ReactionError::is_transient,
            retry,
            handler.name(),
        )
        .await;

        let settlement = match result {
            Ok(reaction) => {
                tracing::debug!(reaction = ?reaction, "Event handled");
                Settlement::Acked
            }
            Err(ReactionError::Permanent(reason)) => {
                tracing::warn!(reason = %reason, "Event cannot be applied, dropping");
                Settlement::Acked
            }
            Err(ReactionError::Transient(reason)) => match handler.failure_policy() {
                FailurePolicy::AckAndDrop => {
                    tracing::error!(
                        reason = %reason,
                        attempts = retry.max_attempts,
                        "Event processing failed after retries, dropping"
                    );
                    Settlement::Acked
                }
                FailurePolicy::NackRequeue => {
                    tracing::warn!(
                        reason = %reason,
                        attempts = retry.max_attempts,
                        "Event processing failed after retries, requeueing"
                    );
                    Settlement::Requeued
                }
            },
        };

        settle(&delivery, settlement).await;
        settlement
    }
    .instrument(span)
    .await
}

async fn settle(delivery: &Delivery, settlement: Settlement) {
    let result = match settlement {
        Settlement::Acked => delivery.ack().await,
        Settlement::Requeued => delivery.reject(true).await,
        Settlement::Discarded => delivery.reject(false).await,
    };

    // The channel is gone; the broker redelivers unsettled messages
    if let Err(e) = result {
        tracing::warn!(
            routing_key = %delivery.routing_key,
            error = %e,
            "Failed to settle delivery"
        );
    }
}
