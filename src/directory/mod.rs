pub mod manager;

pub use manager::{validate_index_name, DirectoryManager, DirectoryStats};
