//! # Node Runtime Library
//!
//! Configuration, wiring and lifecycle of a fragment-distribution node.
//! The entry point is the `main.rs` binary; the modules are public so the
//! integration suite can assemble networks the same way.
//!
//! ## Modules
//!
//! - `config` - `NodeConfig` loaded from TOML and `FD_*` overrides
//! - `wiring` - one tracker and N peers over an `InMemoryEventBus`
//! - `demo` - generated file published and replicated across the peers
//! - `runtime` - start, run until signalled, shut down

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod demo;
pub mod runtime;
pub mod wiring;

pub use config::{NodeConfig, NodeConfigError, CONFIG_PATH_ENV};
pub use demo::{DemoFile, DemoReport};
pub use runtime::NodeRuntime;
pub use wiring::{Network, PeerNode, TRACKER_ID};
