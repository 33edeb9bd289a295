//! Chunking and the ingestion workflow.

pub mod core;
pub mod splitter;

pub use self::core::{EnsureOutcome, FileOutcome, FileStatus, IngestReport, Indexer};
pub use self::splitter::{Chunk, TextSplitter};
