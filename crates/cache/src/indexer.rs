//! Background indexer.
//!
//! `schedule` enqueues a fire-and-forget job: chunk the body, embed every
//! chunk, upload the batch to the search proxy, mark the cache entry
//! indexed. Jobs are bounded by a semaphore and deduplicated by
//! `(doc id, index name)` — at most one build per key runs at a time, and
//! duplicate schedules coalesce into the running one. Loss of queued jobs
//! on process restart is acceptable: the next retrieval hit re-schedules.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use rg_domain::config::IndexConfig;
use rg_domain::document::{split_key, Chunk, Document};
use rg_domain::error::Result;
use rg_providers::EmbeddingsProvider;

use crate::chunker::chunk_document;
use crate::store::DocumentCache;

/// Per-job wall clock bound; a stuck upstream never pins a worker.
const JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Destination for embedded chunk batches. The gateway wires this to the
/// search proxy's `/index` endpoint; tests substitute a recorder.
#[async_trait::async_trait]
pub trait ChunkUploader: Send + Sync {
    async fn upload(&self, index_name: &str, chunks: Vec<Chunk>) -> Result<()>;
}

pub struct Indexer {
    cache: Arc<DocumentCache>,
    embeddings: Arc<dyn EmbeddingsProvider>,
    uploader: Arc<dyn ChunkUploader>,
    /// Single-build keys currently running: `(doc_id, index_name)`.
    inflight: Mutex<HashSet<(String, String)>>,
    /// Keys already built this process. The cache envelope's `indexed`
    /// flag is per document, but a document promotes into one index per
    /// tenant that retrieves it, so build dedup is tracked per key.
    /// Lost on restart — uploads are idempotent upserts, so the next
    /// retrieval hit rebuilds at worst once.
    built: Mutex<HashSet<(String, String)>>,
    jobs: Arc<Semaphore>,
}

impl Indexer {
    pub fn new(
        cfg: &IndexConfig,
        cache: Arc<DocumentCache>,
        embeddings: Arc<dyn EmbeddingsProvider>,
        uploader: Arc<dyn ChunkUploader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cache,
            embeddings,
            uploader,
            inflight: Mutex::new(HashSet::new()),
            built: Mutex::new(HashSet::new()),
            jobs: Arc::new(Semaphore::new(cfg.max_concurrent_jobs.max(1))),
        })
    }

    /// Enqueue a background indexing job and return immediately.
    ///
    /// Duplicate schedules for a key already building coalesce to the
    /// running job.
    pub fn schedule(self: &Arc<Self>, document: Document, index_name: String) {
        let key = (document.doc_id.clone(), index_name.clone());
        if self.built.lock().contains(&key) {
            return;
        }
        {
            let mut inflight = self.inflight.lock();
            if !inflight.insert(key.clone()) {
                tracing::debug!(
                    doc_id = %document.doc_id,
                    index = %index_name,
                    "indexing already in flight, coalescing"
                );
                return;
            }
        }

        let indexer = self.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(
                JOB_TIMEOUT,
                indexer.run_job(&document, &index_name),
            )
            .await;

            match result {
                Ok(Ok(chunks)) => {
                    indexer.built.lock().insert(key.clone());
                    tracing::info!(
                        doc_id = %document.doc_id,
                        index = %index_name,
                        chunks,
                        "document indexed"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        doc_id = %document.doc_id,
                        index = %index_name,
                        error = %e,
                        "indexing job failed"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        doc_id = %document.doc_id,
                        index = %index_name,
                        "indexing job timed out"
                    );
                }
            }

            indexer.inflight.lock().remove(&key);
        });
    }

    async fn run_job(&self, document: &Document, index_name: &str) -> Result<usize> {
        let _permit = self
            .jobs
            .acquire()
            .await
            .map_err(|_| rg_domain::Error::Other("indexer shut down".into()))?;

        let mut chunks = chunk_document(document);
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }

        let count = chunks.len();
        self.uploader.upload(index_name, chunks).await?;

        if let Some((kind, local_id)) = split_key(&document.doc_id) {
            self.cache.mark_indexed(kind, local_id, Utc::now())?;
        }

        Ok(count)
    }
}
