//! # Core Metadata Entities
//!
//! Records embedded in wire payloads and persisted catalogs.
//!
//! ## Clusters
//!
//! - **Content**: `FileMetadata`, `FragmentMetadata`
//! - **Network**: `ClientMetadata`, `ClientJoinDeniedCode`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized content hash of a file or fragment.
pub type ContentHash = String;

/// Transport-level identifier of a node.
pub type PeerId = String;

/// Size and ordered fragment list of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileMetadata {
    /// Total file size in bytes.
    pub size: i64,
    /// Fragment hashes in reconstruction order.
    pub fragment_sequence: Vec<ContentHash>,
}

impl FileMetadata {
    #[must_use]
    pub fn new(size: i64, fragment_sequence: Vec<ContentHash>) -> Self {
        Self {
            size,
            fragment_sequence,
        }
    }
}

/// Size of a single fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FragmentMetadata {
    pub size: i64,
}

impl FragmentMetadata {
    #[must_use]
    pub fn new(size: i64) -> Self {
        Self { size }
    }
}

/// A peer's advertised endpoints and fragment inventory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientMetadata {
    /// Base URIs from which stored fragments can be fetched.
    pub endpoints: Vec<String>,
    /// Hashes of fragments the peer stores.
    pub stored_fragments: Vec<ContentHash>,
}

impl ClientMetadata {
    #[must_use]
    pub fn new(endpoints: Vec<String>, stored_fragments: Vec<ContentHash>) -> Self {
        Self {
            endpoints,
            stored_fragments,
        }
    }
}

/// Reason a join request was denied.
///
/// Encoded on the wire as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ClientJoinDeniedCode {
    /// The peer's fragment size differs from the tracker's.
    WrongFragmentSize = 1,
    /// The peer hashes with a different algorithm.
    WrongHashAlgorithm = 2,
    /// One of the peer's endpoints is claimed by a registered peer.
    EndpointConflict = 4,
    /// Any other reason, see the accompanying text.
    Other = 128,
}

impl ClientJoinDeniedCode {
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<ClientJoinDeniedCode> for i32 {
    fn from(code: ClientJoinDeniedCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for ClientJoinDeniedCode {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::WrongFragmentSize),
            2 => Ok(Self::WrongHashAlgorithm),
            4 => Ok(Self::EndpointConflict),
            128 => Ok(Self::Other),
            other => Err(format!("unknown join denial code {other}")),
        }
    }
}

impl fmt::Display for ClientJoinDeniedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WrongFragmentSize => "WrongFragmentSize",
            Self::WrongHashAlgorithm => "WrongHashAlgorithm",
            Self::EndpointConflict => "EndpointConflict",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}
