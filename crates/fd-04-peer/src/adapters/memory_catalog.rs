//! Catalog that keeps its committed snapshot in memory.

use crate::error::CatalogError;
use crate::ports::{CatalogContents, PersistentCatalog};

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    working: CatalogContents,
    committed: CatalogContents,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog whose committed state is `contents`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::MissingMetadata` if `contents` could not have
    /// been committed.
    pub fn with_contents(contents: CatalogContents) -> Result<Self, CatalogError> {
        contents.ensure_committable()?;
        let contents = contents.normalized();
        Ok(Self {
            working: contents.clone(),
            committed: contents,
        })
    }

    #[must_use]
    pub fn committed(&self) -> &CatalogContents {
        &self.committed
    }
}

impl PersistentCatalog for InMemoryCatalog {
    fn contents(&self) -> &CatalogContents {
        &self.working
    }

    fn contents_mut(&mut self) -> &mut CatalogContents {
        &mut self.working
    }

    fn is_committed(&self) -> bool {
        self.working == self.committed
    }

    fn commit(&mut self) -> Result<(), CatalogError> {
        if let Err(e) = self.working.ensure_committable() {
            self.revert();
            return Err(e);
        }
        self.committed = self.working.clone().normalized();
        self.working = self.committed.clone();
        Ok(())
    }

    fn revert(&mut self) {
        self.working = self.committed.clone();
    }
}
