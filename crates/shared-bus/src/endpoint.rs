//! # Transport Endpoint
//!
//! The narrow contract a node uses to talk to the network: publish a payload
//! on a topic, register a single inbound callback, and expose a stable
//! identifier. [`BusEndpoint`] implements it over [`InMemoryEventBus`].

use crate::events::{CodecError, DistributionEvent, EventFilter, EventTopic, WireMessage};
use crate::publisher::{EventPublisher, InMemoryEventBus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Inbound message callback. Must not block.
pub type MessageCallback = Arc<dyn Fn(WireMessage) + Send + Sync>;

/// Errors reported by a transport endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint is not connected.
    #[error("Endpoint '{0}' is disconnected")]
    Disconnected(String),

    /// `on_message` was called twice.
    #[error("A message callback is already registered")]
    CallbackAlreadyRegistered,
}

/// Errors from publishing a typed event.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A node's connection to the publish/subscribe network.
#[async_trait]
pub trait TransportEndpoint: Send + Sync {
    /// Stable identifier of this node on the network.
    fn client_id(&self) -> &str;

    /// Publish `payload` on `topic`. Resolves once the transport accepted it.
    async fn publish(&self, topic: EventTopic, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Register the inbound message callback. May be called once.
    fn on_message(&self, callback: MessageCallback) -> Result<(), TransportError>;
}

/// Encode `event` and publish it on its topic.
///
/// # Errors
///
/// - `PublishError::Encode` - serialization failed
/// - `PublishError::Transport` - the transport rejected the publish
pub async fn publish_event(
    transport: &dyn TransportEndpoint,
    event: &DistributionEvent,
) -> Result<(), PublishError> {
    let topic = event.topic();
    let payload = event.encode().map_err(|e| {
        error!(topic = %topic, error = %e, "Event encoding failed");
        e
    })?;
    transport.publish(topic, payload).await.map_err(|e| {
        error!(topic = %topic, error = %e, "Publish failed");
        PublishError::Transport(e)
    })
}

/// Endpoint on an [`InMemoryEventBus`].
///
/// Inbound delivery runs on a pump task spawned by `on_message`; the task is
/// aborted on `disconnect` or drop.
pub struct BusEndpoint {
    client_id: String,
    bus: Arc<InMemoryEventBus>,
    filter: EventFilter,
    connected: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl BusEndpoint {
    /// Create an endpoint that receives every topic.
    #[must_use]
    pub fn new(client_id: impl Into<String>, bus: Arc<InMemoryEventBus>) -> Self {
        Self::with_filter(client_id, bus, EventFilter::all())
    }

    /// Create an endpoint that receives only topics matching `filter`.
    #[must_use]
    pub fn with_filter(
        client_id: impl Into<String>,
        bus: Arc<InMemoryEventBus>,
        filter: EventFilter,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            bus,
            filter,
            connected: AtomicBool::new(true),
            pump: Mutex::new(None),
        }
    }

    /// Drop the connection: inbound delivery stops and publishes fail.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        debug!(client = %self.client_id, "Endpoint disconnected");
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportEndpoint for BusEndpoint {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, topic: EventTopic, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected(self.client_id.clone()));
        }
        self.bus
            .publish(WireMessage::new(topic, self.client_id.clone(), payload))
            .await;
        Ok(())
    }

    fn on_message(&self, callback: MessageCallback) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected(self.client_id.clone()));
        }
        let mut pump = self.pump.lock();
        if pump.is_some() {
            return Err(TransportError::CallbackAlreadyRegistered);
        }

        // Subscribe before spawning so nothing published after this call is missed
        let mut subscription = self.bus.subscribe(self.filter.clone());
        let client_id = self.client_id.clone();
        *pump = Some(tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                callback(message);
            }
            debug!(client = %client_id, "Bus closed, inbound pump stopped");
        }));
        Ok(())
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}
