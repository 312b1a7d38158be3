//! Fragment storage kept in process memory.

use crate::error::StorageError;
use crate::ports::FragmentStorage;
use parking_lot::RwLock;
use shared_types::ContentHash;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

/// In-memory [`FragmentStorage`] with an optional byte budget.
///
/// Readers get their own handle to the bytes, so deleting a fragment never
/// has to wait for them.
#[derive(Debug, Default)]
pub struct InMemoryFragmentStorage {
    fragments: RwLock<HashMap<ContentHash, Arc<[u8]>>>,
    capacity: Option<usize>,
}

impl InMemoryFragmentStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage refusing writes past `capacity` total bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fragments: RwLock::new(HashMap::new()),
            capacity: Some(capacity),
        }
    }

    /// Total bytes stored.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.fragments.read().values().map(|data| data.len()).sum()
    }

    /// Copy of a stored fragment's bytes.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<Vec<u8>> {
        self.fragments.read().get(hash).map(|data| data.to_vec())
    }
}

impl FragmentStorage for InMemoryFragmentStorage {
    fn store_fragment(&self, hash: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut fragments = self.fragments.write();
        if fragments.contains_key(hash) {
            return Ok(());
        }
        if let Some(capacity) = self.capacity {
            let used: usize = fragments.values().map(|data| data.len()).sum();
            let available = capacity.saturating_sub(used);
            if data.len() > available {
                return Err(StorageError::CapacityExceeded {
                    requested: data.len(),
                    available,
                });
            }
        }
        fragments.insert(hash.to_string(), Arc::from(data));
        Ok(())
    }

    fn read_fragment(&self, hash: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let data = self
            .fragments
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(hash.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn delete_fragment(&self, hash: &str, _wait: bool) -> Result<bool, StorageError> {
        Ok(self.fragments.write().remove(hash).is_some())
    }

    fn fragments(&self) -> Vec<ContentHash> {
        let mut hashes: Vec<ContentHash> = self.fragments.read().keys().cloned().collect();
        hashes.sort();
        hashes
    }

    fn fragment_size(&self, hash: &str) -> Option<i64> {
        self.fragments
            .read()
            .get(hash)
            .and_then(|data| i64::try_from(data.len()).ok())
    }
}
