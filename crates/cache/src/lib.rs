//! Write-through document cache and the background indexing pipeline that
//! grows the vector corpus from retrieval activity.

pub mod chunker;
pub mod indexer;
pub mod store;

pub use indexer::{ChunkUploader, Indexer};
pub use store::{CacheOutcome, DocumentCache};
