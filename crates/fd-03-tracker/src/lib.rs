//! # FD-03 Tracker
//!
//! The authority of a fragment-distribution network. The tracker admits
//! peers, owns the canonical distribution map and replicates fragments onto
//! volunteering peers.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): join reconciliation and phase records
//! - **Service Layer** (`service.rs`): the state machine, driven by bus
//!   events and API calls
//! - **Config** (`config.rs`): fragment size, timeout and replica target
//!
//! ## Protocol Guarantees
//!
//! - At most one phase is in flight; joins, file publications, goodbyes
//!   and distributions queue until the tracker is idle.
//! - Every waiting phase ends on its own timer if peers stay silent.
//! - A failed publish never leaves the map changed.
//!
//! ## Usage Example
//!
//! ```ignore
//! use fd_03_tracker::{TrackerConfig, TrackerService};
//!
//! let tracker = TrackerService::new(TrackerConfig::default(), transport, hashing)?;
//! tracker.start().await?;
//! let uris = tracker.distribute_fragment(&hash, bytes).await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::{TrackerConfig, TrackerConfigError};
pub use domain::TrackerPhase;
pub use error::{Result, TrackerError};
pub use service::{TrackerService, JOIN_TIMEOUT_REASON};
