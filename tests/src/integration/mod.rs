//! # Integration Scenarios
//!
//! Real trackers and peers exchanging messages over an in-memory bus.

pub mod harness;

mod dedup;
mod fanout;
mod join_flow;
mod resync;
mod runtime;
