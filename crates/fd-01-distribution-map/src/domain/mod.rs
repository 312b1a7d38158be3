//! # Domain Layer - Distribution Map
//!
//! ## Components
//!
//! - `entities`: FragmentedFileInfo, FragmentInfo, PeerInfo
//! - `map`: DistributionMap with cascading removals
//! - `invariants`: consistency checks over a map
//! - `errors`: MapError enumeration

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod map;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use map::*;
