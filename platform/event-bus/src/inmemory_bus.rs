//! In-memory broker for testing and development
//!
//! Models the parts of a topic-exchange broker the services rely on:
//! durable exchanges and queues, pattern bindings, per-queue FIFO, manual
//! acknowledgment, and redelivery of unacked messages when a channel dies.
//! State lives in the [`InMemoryBroker`], so it survives channel loss the
//! way a real broker's durable queues do.

use crate::topology::topic_matches;
use crate::{Acknowledger, BusError, BusResult, Connector, Delivery, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    notify: Arc<Notify>,
}

struct Unacked {
    queue: String,
    message: StoredMessage,
    channel_id: u64,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashSet<String>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<(String, String, String)>,
    unacked: HashMap<u64, Unacked>,
    channels: Vec<Arc<InMemoryChannel>>,
}

struct Shared {
    state: Mutex<BrokerState>,
    available: AtomicBool,
    next_id: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A panic while holding the lock leaves the state usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Put a message back at the head of its queue
    fn requeue(state: &mut BrokerState, unacked: Unacked) {
        if let Some(queue) = state.queues.get_mut(&unacked.queue) {
            let mut message = unacked.message;
            message.redelivered = true;
            queue.ready.push_front(message);
            queue.notify.notify_one();
        }
    }
}

/// Broker double shared by every channel it hands out
///
/// # Example
/// ```rust
/// use event_bus::{Connector, EventBus, InMemoryBroker};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = InMemoryBroker::new();
/// let bus = broker.connect().await?;
///
/// bus.declare_exchange("order_events").await?;
/// bus.declare_queue("delivery_order_events").await?;
/// bus.bind_queue("delivery_order_events", "order_events", "order.ready").await?;
///
/// let mut stream = bus.consume("delivery_order_events", "delivery").await?;
/// bus.publish("order_events", "order.ready", b"{}".to_vec()).await?;
///
/// let delivery = stream.next().await.unwrap();
/// assert_eq!(delivery.routing_key, "order.ready");
/// delivery.ack().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState::default()),
                available: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// While unavailable, `connect` fails as if the broker were down
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Close every open channel, as a broker restart would
    ///
    /// Messages the closed channels had not settled go back to the head of
    /// their queues, flagged as redelivered.
    pub fn drop_connections(&self) {
        let channels = {
            let mut state = self.shared.lock();
            std::mem::take(&mut state.channels)
        };
        for channel in channels {
            channel.shut();
        }
    }

    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.shared.lock().exchanges.contains(exchange)
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.shared.lock().queues.contains_key(queue)
    }

    pub fn binding_count(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .bindings
            .iter()
            .filter(|(q, _, _)| q == queue)
            .count()
    }

    /// Messages waiting in `queue`, not counting ones handed out and unacked
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Messages handed out to consumers and not yet settled
    pub fn unacked_count(&self) -> usize {
        self.shared.lock().unacked.len()
    }

    /// Channels that are currently open
    pub fn open_channels(&self) -> usize {
        self.shared.lock().channels.len()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self) -> BusResult<Arc<dyn EventBus>> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(BusError::ConnectionError(
                "in-memory broker unavailable".to_string(),
            ));
        }

        let channel = Arc::new(InMemoryChannel {
            id: self.shared.next_id(),
            shared: self.shared.clone(),
            open: AtomicBool::new(true),
            closed: Notify::new(),
        });
        self.shared.lock().channels.push(channel.clone());

        Ok(channel as Arc<dyn EventBus>)
    }
}

/// One channel on an [`InMemoryBroker`]
pub struct InMemoryChannel {
    id: u64,
    shared: Arc<Shared>,
    open: AtomicBool,
    closed: Notify,
}

impl InMemoryChannel {
    fn ensure_open(&self) -> BusResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(BusError::ConnectionError("channel closed".to_string()))
        }
    }

    /// Close without going through the broker's channel list
    fn shut(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        let mut state = self.shared.lock();
        let mut tags: Vec<u64> = state
            .unacked
            .iter()
            .filter(|(_, u)| u.channel_id == self.id)
            .map(|(tag, _)| *tag)
            .collect();
        // Newest first, so the oldest ends up at the head of its queue
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in tags {
            if let Some(unacked) = state.unacked.remove(&tag) {
                Shared::requeue(&mut state, unacked);
            }
        }
        drop(state);

        self.closed.notify_waiters();
    }
}

#[async_trait]
impl EventBus for InMemoryChannel {
    async fn declare_exchange(&self, exchange: &str) -> BusResult<()> {
        self.ensure_open()?;
        self.shared.lock().exchanges.insert(exchange.to_string());
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> BusResult<()> {
        self.ensure_open()?;
        self.shared
            .lock()
            .queues
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, pattern: &str) -> BusResult<()> {
        self.ensure_open()?;
        let mut state = self.shared.lock();

        if !state.exchanges.contains(exchange) {
            return Err(BusError::DeclareError(format!(
                "binding to undeclared exchange '{exchange}'"
            )));
        }
        if !state.queues.contains_key(queue) {
            return Err(BusError::DeclareError(format!(
                "binding undeclared queue '{queue}'"
            )));
        }

        let binding = (queue.to_string(), exchange.to_string(), pattern.to_string());
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: Vec<u8>) -> BusResult<()> {
        self.ensure_open()?;
        let mut state = self.shared.lock();

        if !state.exchanges.contains(exchange) {
            return Err(BusError::PublishError(format!(
                "no exchange '{exchange}'"
            )));
        }

        // A queue bound more than once still gets one copy
        let targets: HashSet<String> = state
            .bindings
            .iter()
            .filter(|(_, ex, pattern)| ex == exchange && topic_matches(pattern, routing_key))
            .map(|(queue, _, _)| queue.clone())
            .collect();

        for queue in targets {
            if let Some(queue) = state.queues.get_mut(&queue) {
                queue.ready.push_back(StoredMessage {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    payload: payload.clone(),
                    redelivered: false,
                });
                queue.notify.notify_one();
            }
        }

        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
    ) -> BusResult<BoxStream<'static, Delivery>> {
        self.ensure_open()?;

        let notify = self
            .shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.notify.clone())
            .ok_or_else(|| BusError::SubscribeError(format!("no queue '{queue}'")))?;

        let channel = self
            .shared
            .lock()
            .channels
            .iter()
            .find(|c| c.id == self.id)
            .cloned()
            .ok_or_else(|| BusError::ConnectionError("channel closed".to_string()))?;

        let queue = queue.to_string();

        let stream = async_stream::stream! {
            loop {
                // Register interest before checking, so a close or publish
                // between the check and the await is not missed
                let closed = channel.closed.notified();
                let published = notify.notified();
                tokio::pin!(closed, published);
                closed.as_mut().enable();
                published.as_mut().enable();

                if !channel.is_open() {
                    break;
                }

                let next = {
                    let mut state = channel.shared.lock();
                    let message = state
                        .queues
                        .get_mut(&queue)
                        .and_then(|q| q.ready.pop_front());
                    message.map(|message| {
                        let tag = channel.shared.next_id();
                        state.unacked.insert(tag, Unacked {
                            queue: queue.clone(),
                            message: message.clone(),
                            channel_id: channel.id,
                        });
                        (tag, message)
                    })
                };

                match next {
                    Some((tag, message)) => {
                        let acker = Arc::new(InMemoryAcker {
                            tag,
                            shared: channel.shared.clone(),
                        });
                        yield Delivery::new(
                            message.exchange,
                            message.routing_key,
                            message.payload,
                            message.redelivered,
                            acker,
                        );
                    }
                    None => {
                        tokio::select! {
                            _ = &mut closed => break,
                            _ = &mut published => {}
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> BusResult<()> {
        self.shared.lock().channels.retain(|c| c.id != self.id);
        self.shut();
        Ok(())
    }
}

struct InMemoryAcker {
    tag: u64,
    shared: Arc<Shared>,
}

#[async_trait]
impl Acknowledger for InMemoryAcker {
    async fn ack(&self) -> BusResult<()> {
        match self.shared.lock().unacked.remove(&self.tag) {
            Some(_) => Ok(()),
            None => Err(BusError::AckError(format!(
                "delivery {} is not outstanding",
                self.tag
            ))),
        }
    }

    async fn reject(&self, requeue: bool) -> BusResult<()> {
        let mut state = self.shared.lock();
        let unacked = state.unacked.remove(&self.tag).ok_or_else(|| {
            BusError::AckError(format!("delivery {} is not outstanding", self.tag))
        })?;
        if requeue {
            Shared::requeue(&mut state, unacked);
        }
        Ok(())
    }
}
