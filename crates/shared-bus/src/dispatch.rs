//! # Event Dispatch
//!
//! Turns raw transport messages into handler calls.
//!
//! ## Pipeline
//!
//! ```text
//! WireMessage ──decode──> DistributionEvent ──dedup──> spawn ──> EventHandler::handle
//!      │                         │                                   │
//!      └─ malformed: dropped     └─ seen before: dropped             └─ error: logged
//! ```
//!
//! Every inbound message runs on its own task, so a slow or failing handler
//! never blocks the transport or other messages.

use crate::endpoint::{TransportEndpoint, TransportError};
use crate::events::{DistributionEvent, WireMessage};
use crate::seen_cache::SeenEventCache;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Receives decoded, deduplicated events.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    type Error: fmt::Display + Send;

    /// Handle one event published by `sender_id`.
    async fn handle(&self, sender_id: &str, event: DistributionEvent) -> Result<(), Self::Error>;
}

/// What happened to a single inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran and succeeded.
    Handled,
    /// The event id was already processed.
    Duplicate,
    /// The payload could not be decoded.
    Malformed,
    /// The handler returned an error.
    Failed,
}

/// Decodes, deduplicates and dispatches inbound messages to a handler.
pub struct EventDispatcher<H> {
    node_id: String,
    handler: Arc<H>,
    seen: Mutex<SeenEventCache>,
}

impl<H: EventHandler> EventDispatcher<H> {
    #[must_use]
    pub fn new(node_id: impl Into<String>, handler: Arc<H>, seen: SeenEventCache) -> Self {
        Self {
            node_id: node_id.into(),
            handler,
            seen: Mutex::new(seen),
        }
    }

    /// Run the full pipeline for `message` on the current task.
    pub async fn process(&self, message: WireMessage) -> DispatchOutcome {
        let event = match message.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    node = %self.node_id,
                    topic = %message.topic,
                    sender = %message.sender_id,
                    error = %e,
                    "Dropping malformed message"
                );
                return DispatchOutcome::Malformed;
            }
        };

        let event_id = event.event_id();
        let fresh = self.seen.lock().insert(event_id);
        if !fresh {
            debug!(
                node = %self.node_id,
                event_id = %event_id,
                topic = %message.topic,
                "Duplicate event ignored"
            );
            return DispatchOutcome::Duplicate;
        }

        trace!(
            node = %self.node_id,
            event_id = %event_id,
            topic = %message.topic,
            sender = %message.sender_id,
            "Dispatching event"
        );
        match self.handler.handle(&message.sender_id, event).await {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                warn!(
                    node = %self.node_id,
                    event_id = %event_id,
                    topic = %message.topic,
                    error = %e,
                    "Event handler failed"
                );
                DispatchOutcome::Failed
            }
        }
    }

    /// Process `message` on a new task.
    pub fn dispatch(self: &Arc<Self>, message: WireMessage) -> JoinHandle<DispatchOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.process(message).await })
    }

    /// Register this dispatcher as `transport`'s inbound callback.
    ///
    /// The callback holds a weak reference; once the dispatcher is dropped
    /// inbound messages are discarded.
    ///
    /// # Errors
    ///
    /// Propagates the transport's registration error.
    pub fn attach(
        self: &Arc<Self>,
        transport: &dyn TransportEndpoint,
    ) -> Result<(), TransportError> {
        let weak = Arc::downgrade(self);
        transport.on_message(Arc::new(move |message| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.dispatch(message);
            }
        }))
    }

    /// Number of event ids currently remembered.
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }
}
