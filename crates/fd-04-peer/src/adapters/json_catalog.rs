//! Catalog persisted as a JSON document on disk.
//!
//! Document layout:
//!
//! ```json
//! {
//!   "Metadata": { "HashAlgorithm": "SHA256", "FragmentSize": 80000 },
//!   "FileInfos": [ { "Hash": "..", "Size": 12, "FragmentSequence": [".."] } ]
//! }
//! ```
//!
//! Committing an empty catalog deletes the document.

use crate::error::CatalogError;
use crate::ports::{CatalogContents, PersistentCatalog};
use serde::{Deserialize, Serialize};
use shared_types::{ContentHash, FileMetadata};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogDocument {
    #[serde(default)]
    metadata: DocumentMetadata,
    #[serde(default)]
    file_infos: Vec<DocumentFileInfo>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentMetadata {
    #[serde(default)]
    hash_algorithm: Option<String>,
    #[serde(default)]
    fragment_size: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DocumentFileInfo {
    hash: ContentHash,
    size: i64,
    fragment_sequence: Vec<ContentHash>,
}

impl From<&CatalogContents> for CatalogDocument {
    fn from(contents: &CatalogContents) -> Self {
        Self {
            metadata: DocumentMetadata {
                hash_algorithm: contents.hash_algorithm.clone(),
                fragment_size: contents.fragment_size,
            },
            file_infos: contents
                .file_infos
                .iter()
                .map(|(hash, meta)| DocumentFileInfo {
                    hash: hash.clone(),
                    size: meta.size,
                    fragment_sequence: meta.fragment_sequence.clone(),
                })
                .collect(),
        }
    }
}

impl From<CatalogDocument> for CatalogContents {
    fn from(document: CatalogDocument) -> Self {
        Self {
            hash_algorithm: document.metadata.hash_algorithm,
            fragment_size: document.metadata.fragment_size,
            file_infos: document
                .file_infos
                .into_iter()
                .map(|file| (file.hash, FileMetadata::new(file.size, file.fragment_sequence)))
                .collect(),
        }
    }
}

/// [`PersistentCatalog`] backed by a JSON file.
#[derive(Debug)]
pub struct JsonFileCatalog {
    path: PathBuf,
    working: CatalogContents,
    committed: CatalogContents,
}

impl JsonFileCatalog {
    /// Open the catalog at `path`. A missing file is an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns an I/O or JSON error if the document exists but cannot be
    /// read, or `MissingMetadata` if it lists files without metadata.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let committed = Self::load(&path)?;
        debug!(path = %path.display(), files = committed.file_infos.len(), "Catalog opened");
        Ok(Self {
            path,
            working: committed.clone(),
            committed,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<CatalogContents, CatalogError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CatalogContents::default()),
            Err(e) => return Err(e.into()),
        };
        let document: CatalogDocument = serde_json::from_slice(&bytes)?;
        let contents = CatalogContents::from(document);
        contents.ensure_committable()?;
        Ok(contents.normalized())
    }

    fn persist(&self, contents: &CatalogContents) -> Result<(), CatalogError> {
        if contents.file_infos.is_empty() {
            return match fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&CatalogDocument::from(contents))?;
        // Staged write, then rename over the previous document
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, bytes)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl PersistentCatalog for JsonFileCatalog {
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
        let result = self
            .working
            .ensure_committable()
            .and_then(|()| self.persist(&self.working.clone().normalized()));
        match result {
            Ok(()) => {
                self.committed = self.working.clone().normalized();
                self.working = self.committed.clone();
                debug!(
                    path = %self.path.display(),
                    files = self.committed.file_infos.len(),
                    "Catalog committed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Catalog commit failed, reverting");
                self.revert();
                Err(e)
            }
        }
    }

    fn revert(&mut self) {
        self.working = self.committed.clone();
    }
}
