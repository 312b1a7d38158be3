//! # Error Types
//!
//! Errors shared by crates that read content hashes from external input.

use thiserror::Error;

/// A hash string failed validation against the active hash service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {algorithm} hash format: '{hash}'")]
pub struct InvalidHashError {
    pub hash: String,
    pub algorithm: String,
}

impl InvalidHashError {
    #[must_use]
    pub fn new(hash: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            algorithm: algorithm.into(),
        }
    }
}
