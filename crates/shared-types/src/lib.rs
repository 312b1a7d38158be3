//! # Shared Types Crate
//!
//! This crate contains the wire payloads exchanged between the tracker and
//! its peers, the metadata records embedded in those payloads, and the hash
//! service both sides use to address content.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every JSON document that crosses the bus is
//!   defined in [`ipc`].
//! - **Envelope-Only Identity**: payloads never name their sender; the
//!   transport envelope carries the sender's client id.
//! - **Forward Compatibility**: unknown JSON properties are skipped, missing
//!   or duplicated required properties fail decoding.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod encoding;
pub mod entities;
pub mod errors;
pub mod hashing;
pub mod ipc;

pub use entities::*;
pub use errors::*;
pub use hashing::{HashService, Sha256HashService};
pub use ipc::*;
