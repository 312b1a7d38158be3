//! Reference adapters for the peer's outbound ports

pub mod json_catalog;
pub mod memory_catalog;
pub mod memory_storage;

pub use json_catalog::JsonFileCatalog;
pub use memory_catalog::InMemoryCatalog;
pub use memory_storage::InMemoryFragmentStorage;
