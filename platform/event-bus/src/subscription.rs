//! Binding a consumer queue to a producer's exchange

use futures::stream::BoxStream;
use uuid::Uuid;

use crate::topology::validate_pattern;
use crate::{BusResult, Delivery, EventBus};

/// One durable queue bound to one foreign exchange with one pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub queue: String,
    pub exchange: String,
    pub pattern: String,
}

impl Subscription {
    pub fn new(
        queue: impl Into<String>,
        exchange: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            exchange: exchange.into(),
            pattern: pattern.into(),
        }
    }

    /// Declare both ends, bind them, and start consuming
    ///
    /// The source exchange is declared here too, so a consumer that starts
    /// before the producer ever ran still has something to bind to. Every
    /// step is idempotent, which makes this safe to run on each reconnect.
    pub async fn bind(&self, bus: &dyn EventBus) -> BusResult<BoxStream<'static, Delivery>> {
        validate_pattern(&self.pattern)?;

        bus.declare_exchange(&self.exchange).await?;
        bus.declare_queue(&self.queue).await?;
        bus.bind_queue(&self.queue, &self.exchange, &self.pattern)
            .await?;

        let consumer_tag = format!("{}-{}", self.queue, Uuid::new_v4());
        let stream = bus.consume(&self.queue, &consumer_tag).await?;

        tracing::info!(
            queue = %self.queue,
            exchange = %self.exchange,
            pattern = %self.pattern,
            consumer_tag = %consumer_tag,
            "Subscription bound"
        );

        Ok(stream)
    }
}
