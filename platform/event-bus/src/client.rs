//! Broker connection manager
//!
//! One `MessagingClient` per service process owns the single broker
//! connection and channel. Publishers and consumers share it through an
//! `Arc`. The supervisor started by [`MessagingClient::open`] keeps the
//! channel alive: it retries failed connects at a fixed interval and, once
//! connected, watches for the channel going away and reconnects.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::consumer_retry::RetryConfig;
use crate::reaction::dispatch;
use crate::topology::validate_pattern;
use crate::{BusError, BusResult, Connector, Domain, EventBus, ReactionHandler, Subscription};

/// Delay between connection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How often a connected supervisor polls `EventBus::is_open`
const CHANNEL_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

#[derive(Clone)]
struct Registered {
    subscription: Subscription,
    handler: Arc<dyn ReactionHandler>,
}

/// The live channel plus the signal that it has gone bad
#[derive(Clone)]
struct Connection {
    bus: Arc<dyn EventBus>,
    lost: Arc<Notify>,
}

pub struct MessagingClient {
    service: Domain,
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    retry: RetryConfig,
    current: RwLock<Option<Connection>>,
    // Held across a whole connect so a concurrent subscribe is bound exactly once
    subscriptions: Mutex<Vec<Registered>>,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    supervisor: StdMutex<Option<JoinHandle<()>>>,
}

impl MessagingClient {
    pub fn new(
        service: Domain,
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
    ) -> Arc<Self> {
        Self::with_retry(service, connector, reconnect_delay, RetryConfig::default())
    }

    /// Like [`MessagingClient::new`], with the retry settings used for
    /// transient reaction failures
    pub fn with_retry(
        service: Domain,
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
        retry: RetryConfig,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);

        Arc::new(Self {
            service,
            connector,
            reconnect_delay,
            retry,
            current: RwLock::new(None),
            subscriptions: Mutex::new(Vec::new()),
            state,
            shutdown,
            supervisor: StdMutex::new(None),
        })
    }

    pub fn service(&self) -> Domain {
        self.service
    }

    /// Start the supervisor and return immediately
    ///
    /// The service keeps running while the broker is unreachable; the
    /// supervisor retries every `reconnect_delay` for as long as it takes.
    /// Calling `open` on a client that is already open does nothing.
    pub fn open(self: &Arc<Self>) {
        let mut supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if supervisor.is_some() {
            return;
        }

        self.shutdown.send_replace(false);
        let client = Arc::clone(self);
        *supervisor = Some(tokio::spawn(async move { client.supervise().await }));
    }

    async fn supervise(&self) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            match self.connect().await {
                Ok(_) => {
                    tracing::info!(
                        service = %self.service,
                        exchange = self.service.exchange(),
                        "Connected to broker"
                    );

                    self.watch_connection(&mut shutdown).await;
                    self.clear().await;

                    if *shutdown.borrow() {
                        break;
                    }
                    tracing::warn!(service = %self.service, "Broker connection lost, reconnecting");
                }
                Err(e) => {
                    tracing::error!(
                        service = %self.service,
                        error = %e,
                        retry_in_secs = self.reconnect_delay.as_secs_f64(),
                        "Failed to connect to broker, retrying"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        tracing::info!(service = %self.service, "Broker supervisor stopped");
    }

    /// Wait until the current channel is unusable or shutdown is requested
    async fn watch_connection(&self, shutdown: &mut watch::Receiver<bool>) {
        let Some(connection) = self.current.read().await.clone() else {
            return;
        };

        let mut check = tokio::time::interval(CHANNEL_CHECK_INTERVAL);
        loop {
            tokio::select! {
                _ = connection.lost.notified() => break,
                _ = shutdown.changed() => break,
                _ = check.tick() => {
                    if !connection.bus.is_open() {
                        break;
                    }
                }
            }
        }
    }

    /// One connection attempt
    ///
    /// Opens a channel, declares this service's exchange, and binds every
    /// registered subscription. Any failure closes the half-built channel
    /// and is reported as [`BusError::ConnectionError`].
    pub async fn connect(&self) -> BusResult<Arc<dyn EventBus>> {
        let subscriptions = self.subscriptions.lock().await;

        let bus = self.connector.connect().await?;
        let lost = Arc::new(Notify::new());

        if let Err(e) = self.set_up(&bus, &subscriptions, &lost).await {
            lost.notify_one();
            let _ = bus.close().await;
            return Err(match e {
                BusError::ConnectionError(_) => e,
                other => BusError::ConnectionError(format!("channel setup failed: {other}")),
            });
        }

        *self.current.write().await = Some(Connection {
            bus: bus.clone(),
            lost,
        });
        self.state.send_replace(ConnectionState::Connected);

        Ok(bus)
    }

    async fn set_up(
        &self,
        bus: &Arc<dyn EventBus>,
        subscriptions: &[Registered],
        lost: &Arc<Notify>,
    ) -> BusResult<()> {
        bus.declare_exchange(self.service.exchange()).await?;
        for registered in subscriptions {
            self.start_consumer(bus, registered, lost.clone()).await?;
        }
        Ok(())
    }

    /// Bind one subscription and spawn its dispatch task
    ///
    /// Deliveries are dispatched one at a time, so handler order is queue
    /// order. The task ends with the channel's consumer stream and then
    /// reports the connection as lost.
    async fn start_consumer(
        &self,
        bus: &Arc<dyn EventBus>,
        registered: &Registered,
        lost: Arc<Notify>,
    ) -> BusResult<()> {
        let mut stream = registered.subscription.bind(bus.as_ref()).await?;

        let handler = registered.handler.clone();
        let queue = registered.subscription.queue.clone();
        let retry = self.retry.clone();

        tokio::spawn(async move {
            tracing::info!(queue = %queue, handler = handler.name(), "Starting consumer");

            while let Some(delivery) = stream.next().await {
                dispatch(handler.as_ref(), delivery, &retry).await;
            }

            tracing::warn!(queue = %queue, handler = handler.name(), "Consumer stopped");
            lost.notify_one();
        });

        Ok(())
    }

    /// Register a subscription and its handler
    ///
    /// The binding is re-applied on every connection. An invalid pattern is
    /// refused up front. If a channel is open now, it is bound immediately:
    /// a connectivity failure there is returned and the subscription stays
    /// registered for the next connection, any other failure is returned
    /// and nothing is registered.
    pub async fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn ReactionHandler>,
    ) -> BusResult<()> {
        validate_pattern(&subscription.pattern)?;

        let mut subscriptions = self.subscriptions.lock().await;
        let registered = Registered {
            subscription,
            handler,
        };

        let connection = self.current.read().await.clone();
        let bound = match &connection {
            Some(connection) => {
                self.start_consumer(&connection.bus, &registered, connection.lost.clone())
                    .await
            }
            None => Ok(()),
        };

        match (&bound, &connection) {
            (Err(e), Some(connection)) if e.is_connectivity() => {
                connection.lost.notify_one();
                subscriptions.push(registered);
            }
            (Err(_), _) => {}
            (Ok(()), _) => subscriptions.push(registered),
        }
        bound
    }

    /// The current channel, if connected
    pub async fn channel(&self) -> Option<Arc<dyn EventBus>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|connection| connection.bus.clone())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Resolves once a channel is available
    pub async fn connected(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await;
    }

    /// Report that the current channel failed (e.g. on a publish)
    pub async fn mark_lost(&self) {
        if let Some(connection) = self.current.read().await.as_ref() {
            connection.lost.notify_one();
        }
    }

    async fn clear(&self) {
        let previous = self.current.write().await.take();
        self.state.send_replace(ConnectionState::Disconnected);

        if let Some(connection) = previous {
            if let Err(e) = connection.bus.close().await {
                tracing::debug!(error = %e, "Closing stale channel failed");
            }
        }
    }

    /// Stop the supervisor and close the channel
    pub async fn close(&self) {
        self.shutdown.send_replace(true);

        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = supervisor {
            // Cut short a connect attempt that is still in flight
            handle.abort();
            let _ = handle.await;
        }

        self.clear().await;
        tracing::info!(service = %self.service, "Broker connection closed");
    }
}
