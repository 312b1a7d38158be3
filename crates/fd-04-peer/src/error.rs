//! Error types for the peer and its storage ports

use crate::config::PeerConfigError;
use shared_bus::{PublishError, TransportError};
use shared_types::ClientJoinDeniedCode;
use thiserror::Error;

/// Errors surfaced by peer API calls.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] PeerConfigError),

    #[error("Join denied ({code}): {}", reason.as_deref().unwrap_or("no reason given"))]
    Denied {
        code: ClientJoinDeniedCode,
        reason: Option<String>,
    },

    #[error("Tracker sent an unusable join diff: {0}")]
    InvalidAccept(String),

    #[error("Join timed out")]
    Timeout,

    #[error("Join reset by tracker departure")]
    Reset,

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Join superseded")]
    Aborted,

    #[error("Peer is disposed")]
    Disposed,
}

/// Errors from a fragment storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Fragment {0} not found")]
    NotFound(String),

    #[error("Storing {requested} bytes exceeds the remaining {available} bytes")]
    CapacityExceeded { requested: usize, available: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a persistent catalog backend.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog lists files but has no hash algorithm or fragment size")]
    MissingMetadata,

    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog document is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for peer operations
pub type Result<T> = std::result::Result<T, PeerError>;
