//! # Distribution Events
//!
//! Defines every event that flows over the bus and the JSON codec used on
//! the wire. Payload structs live in `shared-types/src/ipc.rs`; this module
//! maps them onto topics.
//!
//! ## Wire Envelope
//!
//! A [`WireMessage`] is what the transport carries: the topic name, the
//! sender's transport identifier and the UTF-8 JSON payload. The sender is
//! never part of the payload.

use serde::de::DeserializeOwned;
use shared_types::ipc::{
    ClientGoodbye, ClientJoinAccepted, ClientJoinDenied, ClientJoinFailed, ClientJoinRequested,
    ClientJoinSucceeded, ClientRegistered, FileInfoPublished, FragmentDistributionDelivered,
    FragmentDistributionEnded, FragmentDistributionFailed, FragmentDistributionObtained,
    FragmentDistributionRequested, FragmentDistributionStarted, TrackerGoodbye, TrackerHello,
};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors from encoding or decoding wire payloads.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The topic name is not part of the protocol.
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    /// The payload is not a valid document for its topic.
    #[error("Malformed {topic} payload: {source}")]
    Malformed {
        topic: EventTopic,
        #[source]
        source: serde_json::Error,
    },

    /// The event could not be serialized.
    #[error("Failed to encode {topic} payload: {source}")]
    Encode {
        topic: EventTopic,
        #[source]
        source: serde_json::Error,
    },
}

/// Protocol topics. Each corresponds to exactly one event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    TrackerHello,
    TrackerGoodbye,
    ClientJoinRequested,
    ClientJoinAccepted,
    ClientJoinDenied,
    ClientJoinSucceeded,
    ClientJoinFailed,
    ClientRegistered,
    ClientGoodbye,
    FileInfoPublished,
    FragmentDistributionStarted,
    FragmentDistributionRequested,
    FragmentDistributionDelivered,
    FragmentDistributionObtained,
    FragmentDistributionFailed,
    FragmentDistributionEnded,
}

impl EventTopic {
    /// Every protocol topic.
    pub const ALL: [EventTopic; 16] = [
        Self::TrackerHello,
        Self::TrackerGoodbye,
        Self::ClientJoinRequested,
        Self::ClientJoinAccepted,
        Self::ClientJoinDenied,
        Self::ClientJoinSucceeded,
        Self::ClientJoinFailed,
        Self::ClientRegistered,
        Self::ClientGoodbye,
        Self::FileInfoPublished,
        Self::FragmentDistributionStarted,
        Self::FragmentDistributionRequested,
        Self::FragmentDistributionDelivered,
        Self::FragmentDistributionObtained,
        Self::FragmentDistributionFailed,
        Self::FragmentDistributionEnded,
    ];

    /// Topic name used on the transport.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::TrackerHello => "tracker/hello",
            Self::TrackerGoodbye => "tracker/goodbye",
            Self::ClientJoinRequested => "clients/join/requested",
            Self::ClientJoinAccepted => "clients/join/accepted",
            Self::ClientJoinDenied => "clients/join/denied",
            Self::ClientJoinSucceeded => "clients/join/succeeded",
            Self::ClientJoinFailed => "clients/join/failed",
            Self::ClientRegistered => "clients/registered",
            Self::ClientGoodbye => "clients/goodbye",
            Self::FileInfoPublished => "files/info",
            Self::FragmentDistributionStarted => "fragments/distribution/started",
            Self::FragmentDistributionRequested => "fragments/distribution/requested",
            Self::FragmentDistributionDelivered => "fragments/distribution/delivered",
            Self::FragmentDistributionObtained => "fragments/distribution/obtained",
            Self::FragmentDistributionFailed => "fragments/distribution/failed",
            Self::FragmentDistributionEnded => "fragments/distribution/ended",
        }
    }

    /// Resolve a transport topic name.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|topic| topic.wire_name() == name)
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// All events exchanged between the tracker and its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionEvent {
    // =========================================================================
    // TRACKER LIFECYCLE
    // =========================================================================
    TrackerHello(TrackerHello),
    TrackerGoodbye(TrackerGoodbye),

    // =========================================================================
    // JOIN HANDSHAKE
    // =========================================================================
    ClientJoinRequested(ClientJoinRequested),
    ClientJoinAccepted(ClientJoinAccepted),
    ClientJoinDenied(ClientJoinDenied),
    ClientJoinSucceeded(ClientJoinSucceeded),
    ClientJoinFailed(ClientJoinFailed),
    ClientRegistered(ClientRegistered),
    ClientGoodbye(ClientGoodbye),

    // =========================================================================
    // CATALOG
    // =========================================================================
    FileInfoPublished(FileInfoPublished),

    // =========================================================================
    // FRAGMENT FAN-OUT
    // =========================================================================
    FragmentDistributionStarted(FragmentDistributionStarted),
    FragmentDistributionRequested(FragmentDistributionRequested),
    FragmentDistributionDelivered(FragmentDistributionDelivered),
    FragmentDistributionObtained(FragmentDistributionObtained),
    FragmentDistributionFailed(FragmentDistributionFailed),
    FragmentDistributionEnded(FragmentDistributionEnded),
}

impl DistributionEvent {
    /// Topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::TrackerHello(_) => EventTopic::TrackerHello,
            Self::TrackerGoodbye(_) => EventTopic::TrackerGoodbye,
            Self::ClientJoinRequested(_) => EventTopic::ClientJoinRequested,
            Self::ClientJoinAccepted(_) => EventTopic::ClientJoinAccepted,
            Self::ClientJoinDenied(_) => EventTopic::ClientJoinDenied,
            Self::ClientJoinSucceeded(_) => EventTopic::ClientJoinSucceeded,
            Self::ClientJoinFailed(_) => EventTopic::ClientJoinFailed,
            Self::ClientRegistered(_) => EventTopic::ClientRegistered,
            Self::ClientGoodbye(_) => EventTopic::ClientGoodbye,
            Self::FileInfoPublished(_) => EventTopic::FileInfoPublished,
            Self::FragmentDistributionStarted(_) => EventTopic::FragmentDistributionStarted,
            Self::FragmentDistributionRequested(_) => EventTopic::FragmentDistributionRequested,
            Self::FragmentDistributionDelivered(_) => EventTopic::FragmentDistributionDelivered,
            Self::FragmentDistributionObtained(_) => EventTopic::FragmentDistributionObtained,
            Self::FragmentDistributionFailed(_) => EventTopic::FragmentDistributionFailed,
            Self::FragmentDistributionEnded(_) => EventTopic::FragmentDistributionEnded,
        }
    }

    /// Unique identifier used for deduplication.
    #[must_use]
    pub fn event_id(&self) -> Uuid {
        match self {
            Self::TrackerHello(e) => e.event_id,
            Self::TrackerGoodbye(e) => e.event_id,
            Self::ClientJoinRequested(e) => e.event_id,
            Self::ClientJoinAccepted(e) => e.event_id,
            Self::ClientJoinDenied(e) => e.event_id,
            Self::ClientJoinSucceeded(e) => e.event_id,
            Self::ClientJoinFailed(e) => e.event_id,
            Self::ClientRegistered(e) => e.event_id,
            Self::ClientGoodbye(e) => e.event_id,
            Self::FileInfoPublished(e) => e.event_id,
            Self::FragmentDistributionStarted(e) => e.event_id,
            Self::FragmentDistributionRequested(e) => e.event_id,
            Self::FragmentDistributionDelivered(e) => e.event_id,
            Self::FragmentDistributionObtained(e) => e.event_id,
            Self::FragmentDistributionFailed(e) => e.event_id,
            Self::FragmentDistributionEnded(e) => e.event_id,
        }
    }

    /// Serialize the payload to UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let topic = self.topic();
        let result = match self {
            Self::TrackerHello(e) => serde_json::to_vec(e),
            Self::TrackerGoodbye(e) => serde_json::to_vec(e),
            Self::ClientJoinRequested(e) => serde_json::to_vec(e),
            Self::ClientJoinAccepted(e) => serde_json::to_vec(e),
            Self::ClientJoinDenied(e) => serde_json::to_vec(e),
            Self::ClientJoinSucceeded(e) => serde_json::to_vec(e),
            Self::ClientJoinFailed(e) => serde_json::to_vec(e),
            Self::ClientRegistered(e) => serde_json::to_vec(e),
            Self::ClientGoodbye(e) => serde_json::to_vec(e),
            Self::FileInfoPublished(e) => serde_json::to_vec(e),
            Self::FragmentDistributionStarted(e) => serde_json::to_vec(e),
            Self::FragmentDistributionRequested(e) => serde_json::to_vec(e),
            Self::FragmentDistributionDelivered(e) => serde_json::to_vec(e),
            Self::FragmentDistributionObtained(e) => serde_json::to_vec(e),
            Self::FragmentDistributionFailed(e) => serde_json::to_vec(e),
            Self::FragmentDistributionEnded(e) => serde_json::to_vec(e),
        };
        result.map_err(|source| CodecError::Encode { topic, source })
    }

    /// Decode a payload received on `topic`.
    ///
    /// # Errors
    ///
    /// - `CodecError::UnknownTopic` - `topic` is not a protocol topic
    /// - `CodecError::Malformed` - invalid JSON, missing or duplicated property
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, CodecError> {
        let topic = EventTopic::from_wire_name(topic)
            .ok_or_else(|| CodecError::UnknownTopic(topic.to_string()))?;

        let event = match topic {
            EventTopic::TrackerHello => Self::TrackerHello(parse(topic, payload)?),
            EventTopic::TrackerGoodbye => Self::TrackerGoodbye(parse(topic, payload)?),
            EventTopic::ClientJoinRequested => Self::ClientJoinRequested(parse(topic, payload)?),
            EventTopic::ClientJoinAccepted => Self::ClientJoinAccepted(parse(topic, payload)?),
            EventTopic::ClientJoinDenied => Self::ClientJoinDenied(parse(topic, payload)?),
            EventTopic::ClientJoinSucceeded => Self::ClientJoinSucceeded(parse(topic, payload)?),
            EventTopic::ClientJoinFailed => Self::ClientJoinFailed(parse(topic, payload)?),
            EventTopic::ClientRegistered => Self::ClientRegistered(parse(topic, payload)?),
            EventTopic::ClientGoodbye => Self::ClientGoodbye(parse(topic, payload)?),
            EventTopic::FileInfoPublished => Self::FileInfoPublished(parse(topic, payload)?),
            EventTopic::FragmentDistributionStarted => {
                Self::FragmentDistributionStarted(parse(topic, payload)?)
            }
            EventTopic::FragmentDistributionRequested => {
                Self::FragmentDistributionRequested(parse(topic, payload)?)
            }
            EventTopic::FragmentDistributionDelivered => {
                Self::FragmentDistributionDelivered(parse(topic, payload)?)
            }
            EventTopic::FragmentDistributionObtained => {
                Self::FragmentDistributionObtained(parse(topic, payload)?)
            }
            EventTopic::FragmentDistributionFailed => {
                Self::FragmentDistributionFailed(parse(topic, payload)?)
            }
            EventTopic::FragmentDistributionEnded => {
                Self::FragmentDistributionEnded(parse(topic, payload)?)
            }
        };
        Ok(event)
    }
}

fn parse<T: DeserializeOwned>(topic: EventTopic, payload: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(|source| CodecError::Malformed { topic, source })
}

/// A message as carried by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    /// Transport topic name.
    pub topic: String,
    /// Transport identifier of the publishing node.
    pub sender_id: String,
    /// UTF-8 JSON payload.
    pub payload: Vec<u8>,
}

impl WireMessage {
    #[must_use]
    pub fn new(topic: EventTopic, sender_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.wire_name().to_string(),
            sender_id: sender_id.into(),
            payload,
        }
    }

    /// Encode `event` into a message from `sender_id`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn from_event(
        sender_id: impl Into<String>,
        event: &DistributionEvent,
    ) -> Result<Self, CodecError> {
        Ok(Self::new(event.topic(), sender_id, event.encode()?))
    }

    /// Decode the carried event.
    ///
    /// # Errors
    ///
    /// See [`DistributionEvent::decode`].
    pub fn decode(&self) -> Result<DistributionEvent, CodecError> {
        DistributionEvent::decode(&self.topic, &self.payload)
    }
}

/// Filter for subscribing to specific topics.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all messages.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if a message matches this filter.
    #[must_use]
    pub fn matches(&self, message: &WireMessage) -> bool {
        self.topics.is_empty()
            || self
                .topics
                .iter()
                .any(|topic| topic.wire_name() == message.topic)
    }
}
