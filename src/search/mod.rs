pub mod cache;
pub mod collector;
pub mod executor;
pub mod highlight;
pub mod iterator;
pub mod scorer;

pub use cache::QueryCache;
pub use collector::{SortOrder, SortSpec, SortedHit};
pub use executor::{ExecutorOutput, SearchContext, SearchExecutor, SearchOptions};
pub use highlight::{HighlightSpec, Highlighter};
