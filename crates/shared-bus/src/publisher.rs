//! # Event Publisher
//!
//! Defines the publishing side of the in-process bus.

use crate::events::{EventFilter, WireMessage};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing wire messages to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a message to the bus.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the message.
    async fn publish(&self, message: WireMessage) -> usize;

    /// Get the total number of messages published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Every subscriber sees every message, including its own publishes.
pub struct InMemoryEventBus {
    /// Broadcast sender for messages.
    sender: broadcast::Sender<WireMessage>,

    /// Total messages published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to messages matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        debug!(topics = ?filter.topics, "New subscription created");
        Subscription::new(receiver, filter)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, message: WireMessage) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let topic = message.topic.clone();
        let sender_id = message.sender_id.clone();
        match self.sender.send(message) {
            Ok(receiver_count) => {
                trace!(
                    topic = %topic,
                    sender = %sender_id,
                    receivers = receiver_count,
                    "Message published"
                );
                receiver_count
            }
            Err(_) => {
                debug!(topic = %topic, sender = %sender_id, "Message dropped (no receivers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
