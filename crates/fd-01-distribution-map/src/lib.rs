//! # FD-01 Distribution Map
//!
//! The node-local, eventually consistent view of the network: which files
//! exist, which fragments they are made of, which peers exist and which
//! fragments each peer stores.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): Pure data structures, no I/O
//!   - `FragmentedFileInfo`, `FragmentInfo`, `PeerInfo`: entities
//!   - `DistributionMap`: the keyed collections and their cascades
//!   - `invariants`: checks used by tests and debug assertions
//!
//! - **Ports Layer** (`ports/`): Trait definitions
//!   - `DistributionObserver`: read-only queries exposed by tracker and peer
//!
//! ## Invariants
//!
//! - **INVARIANT-1**: every fragment's owner set equals the set of peers
//!   whose stored set contains the fragment
//! - **INVARIANT-2**: every key is the normalized hash (or id) of its value
//! - **INVARIANT-3**: additions never overwrite an existing key
//! - **INVARIANT-4**: removing a peer never removes fragments; removing a
//!   file never removes fragments
//!
//! ## Usage Example
//!
//! ```ignore
//! use fd_01_distribution_map::{DistributionMap, FragmentedFileInfo};
//!
//! let mut map = DistributionMap::new();
//! map.try_add_fragment("AB", 12);
//! map.try_add_peer("peer-a", ["grpc://a:1809".to_string()], ["AB".to_string()]);
//! assert_eq!(map.fragment_uris("AB"), Some(vec!["grpc://a:1809/AB".to_string()]));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ports;

pub use domain::*;
pub use ports::*;
