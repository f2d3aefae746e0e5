//! The fixed tool catalog.

pub mod aps;
pub mod cfr;
pub mod drs;
pub mod personal;
pub mod search;

use std::sync::Arc;

use rg_cache::{CacheOutcome, DocumentCache, Indexer};
use rg_domain::document::{Document, SourceKind};
use rg_domain::error::Result;

/// Cache-first fetch with the second-retrieval promotion rule.
///
/// Misses write through with `hit_count = 0, indexed = false` and return
/// content without indexing. A later hit bumps the counter and, once the
/// document has proven relevant (`hit_count >= 1` and not yet indexed),
/// schedules a background build into the calling agent's index. The same
/// cache entry can be promoted into several indices, one per tenant that
/// retrieves it.
pub(crate) async fn fetch_through_cache<F, Fut>(
    cache: &DocumentCache,
    indexer: &Arc<Indexer>,
    auto_index: bool,
    kind: SourceKind,
    local_id: &str,
    index_name: &str,
    fetch: F,
) -> Result<Document>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Document>>,
{
    let (doc, outcome) = cache.get_or_fetch(kind, local_id, fetch).await?;

    // The indexer dedups per (doc, index), so a document already built for
    // one tenant's index still promotes into another tenant's.
    if auto_index && outcome == CacheOutcome::Hit && doc.hit_count >= 1 {
        tracing::debug!(
            doc_id = %doc.doc_id,
            index = %index_name,
            hit_count = doc.hit_count,
            "promoting document to vector corpus"
        );
        indexer.schedule(doc.clone(), index_name.to_owned());
    }

    Ok(doc)
}
