//! # Ports Layer
//!
//! - `inbound`: `DistributionObserver` read-only query API

pub mod inbound;

pub use inbound::*;
