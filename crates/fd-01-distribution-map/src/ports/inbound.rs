//! # Inbound Port - DistributionObserver
//!
//! Read-only queries over a node's distribution map. Implemented by both the
//! tracker and the peer; calls run under a read session and never wait for
//! an in-flight handshake to finish.

use crate::domain::FragmentedFileInfo;
use async_trait::async_trait;

/// Read-only view of a node's distribution state.
///
/// Hash arguments are validated and normalized first; an invalid hash
/// yields `false` or `None`.
#[async_trait]
pub trait DistributionObserver: Send + Sync {
    /// Configured fragment size, once known.
    async fn fragment_size(&self) -> Option<i64>;

    /// Union of all registered peers' endpoints.
    async fn distribution_endpoints(&self) -> Vec<String>;

    async fn exists_file(&self, hash: &str) -> bool;

    async fn exists_fragment(&self, hash: &str) -> bool;

    async fn try_get_file_info(&self, hash: &str) -> Option<FragmentedFileInfo>;

    /// Fetch URIs of every owner of the fragment.
    async fn fragment_distribution(&self, hash: &str) -> Option<Vec<String>>;
}
