//! # EventBus Abstraction
//!
//! The messaging core shared by every food-delivery service: one durable
//! topic exchange per owning domain, durable queues bound to foreign
//! exchanges, and idempotent reactions that acknowledge explicitly.
//!
//! ## Why This Lives in Tier 1
//!
//! Services never call each other; they agree on a topology instead. Putting
//! the topology, the envelope and the connection lifecycle in one platform
//! crate means every module declares the same exchanges, routes with the same
//! keys and decodes the same envelope.
//!
//! ## Implementations
//!
//! - **AmqpBus**: Production implementation on RabbitMQ (via `lapin`)
//! - **InMemoryBroker**: Test/dev broker double with the same routing rules
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{BusConfig, Domain, EventPublisher, MessagingClient};
//!
//! # async fn example() -> Result<(), String> {
//! let config = BusConfig::from_env()?;
//! let client = MessagingClient::new(Domain::Order, config.connector(), config.reconnect_delay);
//! client.open();
//!
//! let publisher = EventPublisher::new(client.clone());
//! publisher
//!     .publish("order.created", &serde_json::json!({ "id": 1 }))
//!     .await;
//! # Ok(())
//! # }
//! ```

mod amqp_bus;
mod client;
mod config;
pub mod consumer_retry;
mod envelope;
mod inmemory_bus;
mod publisher;
mod reaction;
mod subscription;
pub mod topology;

pub use amqp_bus::{AmqpBus, AmqpConnector};
pub use client::{ConnectionState, MessagingClient, DEFAULT_RECONNECT_DELAY};
pub use config::{BusConfig, BusType};
pub use envelope::{string_or_number, validate_envelope_fields, EventEnvelope};
pub use inmemory_bus::{InMemoryBroker, InMemoryChannel};
pub use publisher::EventPublisher;
pub use reaction::{FailurePolicy, Reaction, ReactionError, ReactionHandler};
pub use subscription::Subscription;
pub use topology::{topic_matches, Domain};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// Settles a delivery with the broker that handed it out
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Remove the message from its queue
    async fn ack(&self) -> BusResult<()>;

    /// Refuse the message; `requeue` puts it back at the head of the queue
    async fn reject(&self, requeue: bool) -> BusResult<()>;
}

/// A message received from a queue
///
/// The message stays owned by the broker until it is acked or rejected.
/// Dropping a `Delivery` without settling it leaves it unacked until the
/// channel closes, at which point the broker redelivers it.
pub struct Delivery {
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key it was published with
    pub routing_key: String,
    /// Raw message body
    pub payload: Vec<u8>,
    /// Set when the broker has handed this message out before
    pub redelivered: bool,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        exchange: String,
        routing_key: String,
        payload: Vec<u8>,
        redelivered: bool,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            exchange,
            routing_key,
            payload,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> BusResult<()> {
        self.acker.ack().await
    }

    pub async fn reject(&self, requeue: bool) -> BusResult<()> {
        self.acker.reject(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("failed to declare {0}")]
    DeclareError(String),

    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to queue: {0}")]
    SubscribeError(String),

    #[error("failed to settle delivery: {0}")]
    AckError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}

impl BusError {
    /// Whether this error means the channel is gone and must be reopened
    pub fn is_connectivity(&self) -> bool {
        matches!(self, BusError::ConnectionError(_))
    }
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// One open channel to a broker
///
/// All declarations are idempotent: declaring an exchange or queue that
/// already exists with the same properties succeeds without side effects.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Declare a durable topic exchange
    async fn declare_exchange(&self, exchange: &str) -> BusResult<()>;

    /// Declare a durable queue
    async fn declare_queue(&self, queue: &str) -> BusResult<()>;

    /// Bind a queue to an exchange with a topic pattern (`*` and `#` wildcards)
    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> BusResult<()>;

    /// Publish a persistent message
    ///
    /// A message whose routing key matches no binding is dropped by the
    /// broker; that is not an error.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Start consuming a queue with manual acknowledgment
    ///
    /// The stream ends when the channel closes.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> BusResult<BoxStream<'static, Delivery>>;

    /// Whether the channel can still be used
    fn is_open(&self) -> bool;

    /// Close the channel and its connection
    async fn close(&self) -> BusResult<()>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

/// Opens channels to a broker
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> BusResult<Arc<dyn EventBus>>;
}
