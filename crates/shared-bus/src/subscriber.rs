//! # Event Subscriber
//!
//! Defines the receiving side of the in-process bus.

use crate::events::{EventFilter, WireMessage};
use tokio::sync::broadcast;
use tracing::warn;

/// A subscription handle for receiving messages.
pub struct Subscription {
    receiver: broadcast::Receiver<WireMessage>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<WireMessage>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next message that matches the filter.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "Subscriber lagged, some messages dropped");
                    continue;
                }
            };

            if self.filter.matches(&message) {
                return Some(message);
            }
        }
    }
}
