//! Error types for the tracker

use crate::config::TrackerConfigError;
use shared_bus::{PublishError, TransportError};
use shared_types::InvalidHashError;
use thiserror::Error;

/// Errors surfaced by tracker API calls.
///
/// Inbound event handling never propagates errors past the dispatcher; they
/// are logged there.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] TrackerConfigError),

    #[error(transparent)]
    InvalidHash(#[from] InvalidHashError),

    #[error("Fragment data is empty")]
    EmptyFragment,

    #[error("Fragment of {size} bytes exceeds the maximum of {max}")]
    FragmentTooLarge { size: i64, max: i64 },

    #[error("Fragment digest {actual} does not match hash {expected}")]
    HashMismatch { expected: String, actual: String },

    #[error("Fragment {0} is already distributed")]
    DuplicateFragment(String),

    #[error("File {0} is already published")]
    DuplicateFile(String),

    #[error("File size must be positive, got {0}")]
    InvalidFileSize(i64),

    #[error("No peer volunteered for fragment {0}")]
    NoVolunteers(String),

    #[error("No peer confirmed fragment {0}")]
    NoConfirmations(String),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Operation aborted by shutdown")]
    Aborted,

    #[error("Tracker is disposed")]
    Disposed,
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
