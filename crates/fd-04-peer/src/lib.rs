//! # FD-04 Peer
//!
//! A participant of a fragment-distribution network. The peer joins through
//! the tracker, reconciles its persisted catalog against the tracker's view
//! and stores fragments it volunteers for.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): phase records and the admission policy
//! - **Ports Layer** (`ports/`): fragment storage and persistent catalog
//! - **Adapters Layer** (`adapters/`): in-memory storage, in-memory and
//!   JSON-file catalogs
//! - **Service Layer** (`service.rs`): the state machine
//!
//! ## Protocol Guarantees
//!
//! - The catalog only ever persists a state the tracker registered.
//! - A delivered fragment is stored only if its size and digest match the
//!   announcement.
//! - Every waiting phase ends on its own timer if the tracker stays silent.
//!
//! ## Usage Example
//!
//! ```ignore
//! use fd_04_peer::{InMemoryFragmentStorage, JsonFileCatalog, PeerConfig, PeerService};
//!
//! let peer = PeerService::new(
//!     PeerConfig::default(),
//!     transport,
//!     hashing,
//!     Arc::new(InMemoryFragmentStorage::new()),
//!     Box::new(JsonFileCatalog::open("catalog.json")?),
//! )?;
//! peer.initialize(vec!["http://10.0.0.7:8080".into()]).await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{InMemoryCatalog, InMemoryFragmentStorage, JsonFileCatalog};
pub use config::{PeerConfig, PeerConfigError};
pub use domain::{AcceptAll, AdmissionPolicy, PeerPhase};
pub use error::{CatalogError, PeerError, Result, StorageError};
pub use ports::{CatalogContents, FragmentStorage, PersistentCatalog};
pub use service::PeerService;
