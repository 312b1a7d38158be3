//! Recording transport for unit and integration tests.

use crate::endpoint::{MessageCallback, TransportEndpoint, TransportError};
use crate::events::{CodecError, DistributionEvent, EventTopic, WireMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// A transport that records every publish instead of sending it.
///
/// Tests feed inbound traffic with [`RecordingTransport::inject`] and observe
/// outbound traffic with [`RecordingTransport::published`] or
/// [`RecordingTransport::wait_for`].
pub struct RecordingTransport {
    client_id: String,
    published: Mutex<Vec<DistributionEvent>>,
    callback: Mutex<Option<MessageCallback>>,
    fail_publishes: AtomicBool,
    changes: watch::Sender<usize>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            client_id: client_id.into(),
            published: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
            fail_publishes: AtomicBool::new(false),
            changes,
        }
    }

    /// Make subsequent publishes fail (or succeed again).
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Every event published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<DistributionEvent> {
        self.published.lock().clone()
    }

    /// Events published on `topic`, in order.
    #[must_use]
    pub fn published_on(&self, topic: EventTopic) -> Vec<DistributionEvent> {
        self.published
            .lock()
            .iter()
            .filter(|e| e.topic() == topic)
            .cloned()
            .collect()
    }

    /// Forget recorded publishes.
    pub fn clear(&self) {
        self.published.lock().clear();
    }

    /// Wait until an event on `topic` has been published, up to `limit`.
    pub async fn wait_for(&self, topic: EventTopic, limit: Duration) -> Option<DistributionEvent> {
        let mut changes = self.changes.subscribe();
        let found = tokio::time::timeout(limit, async {
            let _ = changes
                .wait_for(|_| self.published_on(topic).last().is_some())
                .await;
        })
        .await;
        found.ok().and_then(|()| self.published_on(topic).pop())
    }

    /// Wait until at least `count` events on `topic` have been published.
    pub async fn wait_for_count(&self, topic: EventTopic, count: usize, limit: Duration) -> bool {
        let mut changes = self.changes.subscribe();
        tokio::time::timeout(limit, async {
            let _ = changes
                .wait_for(|_| self.published_on(topic).len() >= count)
                .await;
        })
        .await
        .is_ok()
    }

    /// Deliver `event` as if `sender_id` had published it.
    ///
    /// # Errors
    ///
    /// Returns the encoding error if `event` cannot be serialized.
    pub fn inject(&self, sender_id: &str, event: &DistributionEvent) -> Result<(), CodecError> {
        let message = WireMessage::from_event(sender_id, event)?;
        self.inject_raw(message);
        Ok(())
    }

    /// Deliver a raw message, which may be malformed.
    pub fn inject_raw(&self, message: WireMessage) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(message);
        }
    }
}

#[async_trait]
impl TransportEndpoint for RecordingTransport {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn publish(&self, topic: EventTopic, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected(self.client_id.clone()));
        }
        let event = DistributionEvent::decode(topic.wire_name(), &payload)
            .map_err(|_| TransportError::Disconnected(self.client_id.clone()))?;
        let count = {
            let mut published = self.published.lock();
            published.push(event);
            published.len()
        };
        self.changes.send_replace(count);
        Ok(())
    }

    fn on_message(&self, callback: MessageCallback) -> Result<(), TransportError> {
        let mut slot = self.callback.lock();
        if slot.is_some() {
            return Err(TransportError::CallbackAlreadyRegistered);
        }
        *slot = Some(callback);
        Ok(())
    }
}
