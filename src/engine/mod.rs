pub mod doc;
pub mod engine;
pub mod file_lock;
pub mod indexing;
pub mod merge;
pub mod segment;
pub mod segment_reader;
pub mod segment_writer;
pub mod snapshot;
pub mod wal;

pub use doc::{DocEntry, IndexedDocument, LiveDoc};
pub use engine::{Engine, EngineConfig, EngineStats, PRIMARY_TERM};
pub use indexing::DocumentShredder;
pub use snapshot::{SegmentHandle, Snapshot};
