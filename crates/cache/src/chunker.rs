//! Document chunking for the vector index.
//!
//! Bodies split into word-bounded segments of at most ~1000 tokens with a
//! small overlap so section boundaries are not lost between chunks. Chunk
//! count is capped at 100 per document; overflow is dropped with a log
//! line rather than silently.

use rg_domain::document::{chunk_id, Chunk, Document, SourceKind};

/// Approximate tokens per segment. Token count is estimated at 0.75 words
/// per token, the usual English ratio.
const MAX_TOKENS: usize = 1000;
const OVERLAP_TOKENS: usize = 50;
const MAX_CHUNKS: usize = 100;

const WORDS_PER_SEGMENT: usize = MAX_TOKENS * 3 / 4;
const OVERLAP_WORDS: usize = OVERLAP_TOKENS * 3 / 4;

/// Split a document body into indexable chunks. Embeddings are left empty
/// for the indexer to fill.
///
/// Regulatory chunks overlap slightly so a section boundary is never lost
/// between segments. Personal uploads chunk with zero overlap: their
/// fetch path reassembles the body by concatenating chunks in order, and
/// overlap would duplicate text.
pub fn chunk_document(doc: &Document) -> Vec<Chunk> {
    let overlap = if doc.source == SourceKind::Personal {
        0
    } else {
        OVERLAP_WORDS
    };
    chunk_with_overlap(doc, overlap)
}

fn chunk_with_overlap(doc: &Document, overlap_words: usize) -> Vec<Chunk> {
    let words: Vec<&str> = doc.body.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < words.len() && chunks.len() < MAX_CHUNKS {
        let end = (start + WORDS_PER_SEGMENT).min(words.len());
        let text = words[start..end].join(" ");

        let index = chunks.len() as u32;
        chunks.push(Chunk {
            chunk_id: chunk_id(&doc.doc_id, index),
            parent_id: doc.doc_id.clone(),
            chunk_index: index,
            title: doc.title.clone(),
            text,
            citation: doc.citation.clone(),
            source: doc.source,
            owner_fingerprint: doc.owner_fingerprint.clone(),
            uploaded_at: doc.cached_at,
            page_count: doc.page_count,
            file_hash: doc.content_hash.clone(),
            embedding: Vec::new(),
        });

        if end == words.len() {
            break;
        }
        start = end - overlap_words;
    }

    if chunks.len() == MAX_CHUNKS {
        let covered = (MAX_CHUNKS * (WORDS_PER_SEGMENT - overlap_words)) + overlap_words;
        if covered < words.len() {
            tracing::warn!(
                doc_id = %doc.doc_id,
                words = words.len(),
                covered,
                "document exceeds chunk cap; tail not indexed"
            );
        }
    }

    chunks
}
