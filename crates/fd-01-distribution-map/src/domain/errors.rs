//! Distribution map error types.

use thiserror::Error;

/// Errors raised while constructing map entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// A file must have a positive size.
    #[error("File {hash} has invalid size {size}")]
    InvalidFileSize { hash: String, size: i64 },

    /// A fragment must have a positive size.
    #[error("Fragment {hash} has invalid size {size}")]
    InvalidFragmentSize { hash: String, size: i64 },
}

/// A consistency violation found by the invariant checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Owner set and stored sets disagree for a fragment.
    #[error("Fragment {hash} owners {owners:?} do not match storing peers {storing:?}")]
    OwnerMismatch {
        hash: String,
        owners: Vec<String>,
        storing: Vec<String>,
    },

    /// A key differs from the normalized key of its value.
    #[error("Key '{key}' does not match entry '{entry}'")]
    KeyMismatch { key: String, entry: String },

    /// The aggregate endpoint set is not the union of peer endpoints.
    #[error("Aggregate endpoints are out of sync with peers")]
    EndpointsOutOfSync,
}
