//! Ports layer for the peer

pub mod outbound;

pub use outbound::*;
