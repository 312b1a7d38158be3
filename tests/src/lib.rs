//! # Fragment Distribution Test Suite
//!
//! Cross-crate scenarios that drive real `TrackerService` and `PeerService`
//! instances over an `InMemoryEventBus`.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs     # bus, node builders, message tap
//!     ├── join_flow.rs   # handshake, late joiners, denial
//!     ├── fanout.rs      # replication and replica targets
//!     ├── resync.rs      # tracker restarts, peer departures
//!     ├── dedup.rs       # replayed messages
//!     └── runtime.rs     # node runtime from a config file
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fd-tests
//! cargo test -p fd-tests integration::fanout
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

pub mod integration;
