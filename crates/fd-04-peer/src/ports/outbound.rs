//! Outbound ports (driven side - SPI)

use crate::error::{CatalogError, StorageError};
use shared_types::{ContentHash, FileMetadata};
use std::collections::BTreeMap;
use std::io::Read;

/// Port: Byte-level fragment storage
///
/// Fragments are keyed by normalized content hash.
pub trait FragmentStorage: Send + Sync {
    /// Store a fragment. Storing an already stored hash is a no-op.
    fn store_fragment(&self, hash: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Open a stored fragment for reading
    fn read_fragment(&self, hash: &str) -> Result<Box<dyn Read + Send>, StorageError>;

    /// Delete a fragment. With `wait`, block until open readers are done.
    ///
    /// Returns `false` if the fragment was not stored.
    fn delete_fragment(&self, hash: &str, wait: bool) -> Result<bool, StorageError>;

    /// Hashes of every stored fragment
    fn fragments(&self) -> Vec<ContentHash>;

    /// Size of a stored fragment in bytes
    fn fragment_size(&self, hash: &str) -> Option<i64>;
}

/// Durable part of a peer's knowledge: the protocol parameters it last
/// joined with and every file it knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogContents {
    pub hash_algorithm: Option<String>,
    pub fragment_size: Option<i64>,
    pub file_infos: BTreeMap<ContentHash, FileMetadata>,
}

impl CatalogContents {
    /// Check the contents can be persisted.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::MissingMetadata` if files are listed without
    /// a hash algorithm and fragment size.
    pub fn ensure_committable(&self) -> Result<(), CatalogError> {
        let has_metadata = self.hash_algorithm.is_some() && self.fragment_size.is_some();
        if self.file_infos.is_empty() || has_metadata {
            Ok(())
        } else {
            Err(CatalogError::MissingMetadata)
        }
    }

    /// Committed form: an empty catalog carries no metadata.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.file_infos.is_empty() {
            self.hash_algorithm = None;
            self.fragment_size = None;
        }
        self
    }
}

/// Port: Transactional file catalog
///
/// Mutations through [`PersistentCatalog::contents_mut`] stay pending until
/// committed or reverted.
pub trait PersistentCatalog: Send + Sync {
    /// Current, possibly uncommitted, contents
    fn contents(&self) -> &CatalogContents;

    fn contents_mut(&mut self) -> &mut CatalogContents;

    /// Whether the current contents equal the last commit
    fn is_committed(&self) -> bool;

    /// Persist the current contents. A failed commit reverts.
    fn commit(&mut self) -> Result<(), CatalogError>;

    /// Discard uncommitted changes
    fn revert(&mut self);
}
