//! # Shared Bus - Publish/Subscribe Plumbing
//!
//! Everything a node needs to exchange distribution events with the rest of
//! the network.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────┐                         ┌──────────────┐
//! │   Tracker    │                         │     Peer     │
//! │  (handler)   │                         │  (handler)   │
//! └──────▲───────┘                         └──────▲───────┘
//!        │ EventDispatcher                        │ EventDispatcher
//!        │ (decode, dedup, spawn)                 │
//! ┌──────┴───────┐    WireMessage          ┌──────┴───────┐
//! │ BusEndpoint  │ ──────────┐      ┌────> │ BusEndpoint  │
//! └──────────────┘           ▼      │      └──────────────┘
//!                      ┌──────────────┐
//!                      │ InMemoryBus  │
//!                      └──────────────┘
//! ```
//!
//! ## Delivery Guarantees
//!
//! - Transports deliver at least once; the dispatcher's `SeenEventCache`
//!   makes handling at most once per node.
//! - Sender identity comes from the envelope, never from the payload.
//! - A malformed message is dropped without affecting any other message.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod dispatch;
pub mod endpoint;
pub mod events;
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
pub mod publisher;
pub mod seen_cache;
pub mod subscriber;

// Re-export main types
pub use dispatch::{DispatchOutcome, EventDispatcher, EventHandler};
pub use endpoint::{
    publish_event, BusEndpoint, MessageCallback, PublishError, TransportEndpoint, TransportError,
};
pub use events::{CodecError, DistributionEvent, EventFilter, EventTopic, WireMessage};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use seen_cache::SeenEventCache;
pub use subscriber::Subscription;

/// Maximum messages to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
