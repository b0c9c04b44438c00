//! Fire-and-forget event publishing

use std::sync::Arc;

use serde::Serialize;

use crate::topology::validate_routing_key;
use crate::{BusError, BusResult, EventEnvelope, MessagingClient};

/// Publishes this service's events to its own exchange
///
/// Publishing is lossy while the broker is unreachable: an event emitted
/// with no open channel is logged and dropped.
#[derive(Clone)]
pub struct EventPublisher {
    client: Arc<MessagingClient>,
}

impl EventPublisher {
    pub fn new(client: Arc<MessagingClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<MessagingClient> {
        &self.client
    }

    /// Publish an event; never fails and never panics
    ///
    /// Errors are logged. A connectivity error also tells the connection
    /// manager to reconnect.
    pub async fn publish<T: Serialize + ?Sized + Sync>(&self, event_type: &str, data: &T) {
        match self.try_publish(event_type, data).await {
            Ok(()) => {}
            Err(e) if e.is_connectivity() && !self.client.is_connected() => {
                tracing::warn!(
                    event_type = %event_type,
                    "Broker channel not ready, skipping event publish"
                );
            }
            Err(e) => {
                tracing::error!(
                    event_type = %event_type,
                    error = %e,
                    "Failed to publish event"
                );
            }
        }
    }

    /// Publish an event and report the outcome
    ///
    /// The event type is the routing key and must sit in this service's
    /// namespace (`order.*` for the order service).
    pub async fn try_publish<T: Serialize + ?Sized + Sync>(
        &self,
        event_type: &str,
        data: &T,
    ) -> BusResult<()> {
        let service = self.client.service();

        validate_routing_key(event_type)?;
        let envelope = EventEnvelope::new(event_type, data, service.service_name());
        if !envelope.is_owned_by(service.prefix()) {
            return Err(BusError::InvalidTopic(format!(
                "{event_type} is outside the {} namespace",
                service.prefix()
            )));
        }
        let payload = envelope.to_bytes()?;

        let bus = self
            .client
            .channel()
            .await
            .ok_or_else(|| BusError::ConnectionError("broker channel not ready".to_string()))?;

        match bus.publish(service.exchange(), event_type, payload).await {
            Ok(()) => {
                tracing::debug!(
                    event_type = %event_type,
                    exchange = service.exchange(),
                    "Published event"
                );
                Ok(())
            }
            Err(e) => {
                if e.is_connectivity() {
                    self.client.mark_lost().await;
                }
                Err(e)
            }
        }
    }
}
