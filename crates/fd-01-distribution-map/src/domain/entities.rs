//! # Map Entities
//!
//! Files and fragments are keyed by normalized content hash, peers by their
//! transport identifier.

use super::errors::MapError;
use shared_types::{ClientMetadata, ContentHash, FileMetadata, FragmentMetadata, PeerId};
use std::collections::BTreeSet;

/// A file reconstructed by concatenating its fragments in order.
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentedFileInfo {
    hash: ContentHash,
    size: i64,
    fragment_sequence: Vec<ContentHash>,
}

impl FragmentedFileInfo {
    /// # Errors
    ///
    /// Returns `MapError::InvalidFileSize` if `size` is not positive.
    pub fn new(
        hash: impl Into<ContentHash>,
        size: i64,
        fragment_sequence: Vec<ContentHash>,
    ) -> Result<Self, MapError> {
        let hash = hash.into();
        if size <= 0 {
            return Err(MapError::InvalidFileSize { hash, size });
        }
        Ok(Self {
            hash,
            size,
            fragment_sequence,
        })
    }

    /// Build from wire metadata.
    ///
    /// # Errors
    ///
    /// Returns `MapError::InvalidFileSize` if the metadata size is not positive.
    pub fn from_metadata(
        hash: impl Into<ContentHash>,
        meta: &FileMetadata,
    ) -> Result<Self, MapError> {
        Self::new(hash, meta.size, meta.fragment_sequence.clone())
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn size(&self) -> i64 {
        self.size
    }

    #[must_use]
    pub fn fragment_sequence(&self) -> &[ContentHash] {
        &self.fragment_sequence
    }

    #[must_use]
    pub fn to_metadata(&self) -> FileMetadata {
        FileMetadata::new(self.size, self.fragment_sequence.clone())
    }

    /// Whether `meta` describes the same size and fragment layout.
    #[must_use]
    pub fn matches_metadata(&self, meta: &FileMetadata) -> bool {
        self.size == meta.size && self.fragment_sequence == meta.fragment_sequence
    }
}

/// A fragment and the peers currently storing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentInfo {
    hash: ContentHash,
    size: i64,
    pub(crate) owners: BTreeSet<PeerId>,
}

impl FragmentInfo {
    /// # Errors
    ///
    /// Returns `MapError::InvalidFragmentSize` if `size` is not positive.
    pub fn new(hash: impl Into<ContentHash>, size: i64) -> Result<Self, MapError> {
        let hash = hash.into();
        if size <= 0 {
            return Err(MapError::InvalidFragmentSize { hash, size });
        }
        Ok(Self {
            hash,
            size,
            owners: BTreeSet::new(),
        })
    }

    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn size(&self) -> i64 {
        self.size
    }

    #[must_use]
    pub fn owners(&self) -> &BTreeSet<PeerId> {
        &self.owners
    }

    #[must_use]
    pub fn to_metadata(&self) -> FragmentMetadata {
        FragmentMetadata::new(self.size)
    }
}

/// A registered peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    id: PeerId,
    endpoints: BTreeSet<String>,
    pub(crate) stored_fragments: BTreeSet<ContentHash>,
}

impl PeerInfo {
    #[must_use]
    pub fn new(
        id: impl Into<PeerId>,
        endpoints: impl IntoIterator<Item = String>,
        stored_fragments: impl IntoIterator<Item = ContentHash>,
    ) -> Self {
        Self {
            id: id.into(),
            endpoints: endpoints.into_iter().collect(),
            stored_fragments: stored_fragments.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn endpoints(&self) -> &BTreeSet<String> {
        &self.endpoints
    }

    #[must_use]
    pub fn stored_fragments(&self) -> &BTreeSet<ContentHash> {
        &self.stored_fragments
    }

    /// Fetch URI of `fragment_hash` on each of this peer's endpoints.
    #[must_use]
    pub fn fragment_uris(&self, fragment_hash: &str) -> Vec<String> {
        self.endpoints
            .iter()
            .map(|endpoint| format!("{}/{}", endpoint.trim_end_matches('/'), fragment_hash))
            .collect()
    }

    #[must_use]
    pub fn to_metadata(&self) -> ClientMetadata {
        ClientMetadata::new(
            self.endpoints.iter().cloned().collect(),
            self.stored_fragments.iter().cloned().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_requires_positive_size() {
        assert!(FragmentedFileInfo::new("F", 0, vec![]).is_err());
        assert!(FragmentedFileInfo::new("F", -1, vec![]).is_err());
        assert!(FragmentedFileInfo::new("F", 1, vec!["A".into()]).is_ok());
    }

    #[test]
    fn test_fragment_requires_positive_size() {
        assert_eq!(
            FragmentInfo::new("A", 0),
            Err(MapError::InvalidFragmentSize {
                hash: "A".into(),
                size: 0
            })
        );
    }

    #[test]
    fn test_matches_metadata() {
        let file = FragmentedFileInfo::new("F", 10, vec!["A".into(), "B".into()]).unwrap();
        assert!(file.matches_metadata(&FileMetadata::new(10, vec!["A".into(), "B".into()])));
        assert!(!file.matches_metadata(&FileMetadata::new(10, vec!["B".into(), "A".into()])));
        assert!(!file.matches_metadata(&FileMetadata::new(11, vec!["A".into(), "B".into()])));
    }

    #[test]
    fn test_fragment_uris_join_with_single_slash() {
        let peer = PeerInfo::new(
            "p",
            ["http://a".to_string(), "http://b/".to_string()],
            Vec::<String>::new(),
        );
        assert_eq!(peer.fragment_uris("H"), vec!["http://a/H", "http://b/H"]);
    }
}
