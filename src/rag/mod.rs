//! Retrieval pipeline: token-window chunking, the exact-search vector
//! index, and question-scoped chunk selection.

pub mod chunker;
pub mod index;
pub mod selector;

pub use chunker::Chunker;
pub use index::{ChunkMetadata, IndexStore, RebuildOutcome};
pub use selector::RelevanceSelector;
