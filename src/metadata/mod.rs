pub mod store;
pub mod types;

pub use store::{backend_for, FileBackend, MemoryBackend, MetadataBackend, MetadataStore};
pub use types::{IndexMetadata, IndexSettings, IndexState, MetadataSnapshot, TableMetadata};
