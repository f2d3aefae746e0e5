//! Proxy API handlers.
//!
//! The ownership filter is a compiled constant of this module — it is
//! appended to every upstream query unconditionally and is never read from
//! the request. That, plus the fact that no other process holds index
//! credentials, is the entire tenant-isolation mechanism.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use rg_domain::document::Chunk;
use rg_domain::error::Error;
use rg_providers::EmbeddingsProvider;

use crate::upstream::{IndexedChunk, VectorIndexClient};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct ProxyState {
    pub upstream: Arc<VectorIndexClient>,
    pub embeddings: Arc<dyn EmbeddingsProvider>,
    /// SHA-256 of the regulatory-writer bearer. `None` disables
    /// regulatory writes entirely.
    pub writer_token_hash: Option<Vec<u8>>,
    pub embedding_dim: usize,
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn from_domain(e: Error) -> Response {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Ownership(_) => StatusCode::FORBIDDEN,
        Error::Transient(_) | Error::Http(_) | Error::Timeout(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ownership filter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The non-negotiable read filter. Every upstream query gets exactly this,
/// built from the authenticated fingerprint — regardless of what the query
/// text says.
pub fn ownership_filter(fingerprint: &str) -> String {
    format!("owner_fingerprint eq null or owner_fingerprint eq '{fingerprint}'")
}

/// Fingerprints are opaque but constrained to a filter-safe charset so the
/// expression above cannot be escaped from.
pub fn valid_fingerprint(fingerprint: &str) -> bool {
    !fingerprint.is_empty()
        && fingerprint.len() <= 128
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Per-chunk write validation.
///
/// A chunk is writable iff its owner equals the requester's fingerprint,
/// or it is regulatory (no owner) and the request carried the writer
/// credential. Violations surface as errors — never silently dropped.
pub fn validate_upload(
    chunks: &[Chunk],
    fingerprint: Option<&str>,
    writer_authorized: bool,
    expected_dim: usize,
) -> Result<(), Error> {
    for chunk in chunks {
        if chunk.embedding.len() != expected_dim {
            return Err(Error::Http(format!(
                "chunk {}: embedding has {} dimensions, index schema requires {expected_dim}",
                chunk.chunk_id,
                chunk.embedding.len()
            )));
        }
        match (&chunk.owner_fingerprint, fingerprint) {
            (Some(owner), Some(fp)) if owner == fp => {}
            (Some(owner), _) => {
                return Err(Error::Ownership(format!(
                    "chunk {} is owned by a different fingerprint than the request ({owner} != {})",
                    chunk.chunk_id,
                    fingerprint.unwrap_or("<none>")
                )));
            }
            (None, _) if writer_authorized => {}
            (None, _) => {
                return Err(Error::Ownership(format!(
                    "chunk {} is regulatory; request lacks the regulatory-writer credential",
                    chunk.chunk_id
                )));
            }
        }
    }
    Ok(())
}

/// Constant-time bearer comparison via SHA-256 digests.
pub fn token_matches(provided: &str, expected_hash: &[u8]) -> bool {
    let digest = Sha256::digest(provided.as_bytes());
    digest.as_slice().ct_eq(expected_hash).into()
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SearchBody {
    query: String,
    index: String,
    fingerprint: String,
    #[serde(default = "d_top")]
    top: usize,
}

fn d_top() -> usize {
    8
}

pub async fn search(
    State(state): State<ProxyState>,
    Json(body): Json<SearchBody>,
) -> Response {
    if !valid_fingerprint(&body.fingerprint) {
        return api_error(StatusCode::BAD_REQUEST, "invalid fingerprint");
    }
    if body.query.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "empty query");
    }

    let vector = match state.embeddings.embed(&[body.query.clone()]).await {
        Ok(mut vs) => match vs.pop() {
            Some(v) => v,
            None => {
                return api_error(
                    StatusCode::BAD_GATEWAY,
                    "embeddings provider returned an empty batch",
                )
            }
        },
        Err(e) => return from_domain(e),
    };

    let filter = ownership_filter(&body.fingerprint);
    let results = match state
        .upstream
        .query(&body.index, &vector, &filter, body.top.clamp(1, 50))
        .await
    {
        Ok(r) => r,
        Err(e) => return from_domain(e),
    };

    // The filter upstream is the mechanism; this is the tripwire.
    debug_assert!(results
        .iter()
        .all(|r| r.owner_fingerprint.is_none()
            || r.owner_fingerprint.as_deref() == Some(body.fingerprint.as_str())));

    let hits: Vec<serde_json::Value> = results
        .into_iter()
        .map(|r| {
            serde_json::json!({
                "chunk_id": r.chunk_id,
                "parent_id": r.parent_id,
                "title": r.title,
                "text": r.text,
                "citation": r.citation,
                "source": r.source,
                "owner_fingerprint": r.owner_fingerprint,
                "score": r.score,
            })
        })
        .collect();

    Json(serde_json::json!({ "hits": hits })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct IndexBody {
    index: String,
    #[serde(default)]
    fingerprint: Option<String>,
    documents: Vec<Chunk>,
}

pub async fn index(
    State(state): State<ProxyState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<IndexBody>,
) -> Response {
    if let Some(ref fp) = body.fingerprint {
        if !valid_fingerprint(fp) {
            return api_error(StatusCode::BAD_REQUEST, "invalid fingerprint");
        }
    }
    if body.documents.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "empty document batch");
    }

    let writer_authorized = match (&state.writer_token_hash, bearer_token(&headers)) {
        (Some(hash), Some(token)) => token_matches(token, hash),
        _ => false,
    };

    if let Err(e) = validate_upload(
        &body.documents,
        body.fingerprint.as_deref(),
        writer_authorized,
        state.embedding_dim,
    ) {
        tracing::warn!(
            index = %body.index,
            error = %e,
            "rejected index write"
        );
        return from_domain(e);
    }

    match state.upstream.upload(&body.index, &body.documents).await {
        Ok(()) => Json(serde_json::json!({ "indexed": body.documents.len() })).into_response(),
        Err(e) => from_domain(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct DocumentsQuery {
    fingerprint: String,
    index: String,
}

pub async fn list_documents(
    State(state): State<ProxyState>,
    Query(query): Query<DocumentsQuery>,
) -> Response {
    if !valid_fingerprint(&query.fingerprint) {
        return api_error(StatusCode::BAD_REQUEST, "invalid fingerprint");
    }

    let filter = format!("owner_fingerprint eq '{}'", query.fingerprint);
    let chunks = match state.upstream.scan(&query.index, &filter).await {
        Ok(c) => c,
        Err(e) => return from_domain(e),
    };

    let documents = aggregate_documents(&chunks);
    Json(serde_json::json!({ "documents": documents })).into_response()
}

/// Collapse a chunk scan into one row per parent document.
fn aggregate_documents(chunks: &[IndexedChunk]) -> Vec<serde_json::Value> {
    let mut by_parent: BTreeMap<&str, (&IndexedChunk, u32)> = BTreeMap::new();
    for chunk in chunks {
        by_parent
            .entry(chunk.parent_id.as_str())
            .and_modify(|(_, n)| *n += 1)
            .or_insert((chunk, 1));
    }
    by_parent
        .into_iter()
        .map(|(parent_id, (first, count))| {
            serde_json::json!({
                "document_id": parent_id,
                "title": first.title,
                "page_count": first.page_count,
                "uploaded_at": first.uploaded_at,
                "chunk_count": count,
                "file_hash": first.file_hash,
            })
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /documents/{id}/chunks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered chunk listing for one personal document, used by the backend
/// to reassemble the full text. Ownership-checked like delete.
pub async fn document_chunks(
    State(state): State<ProxyState>,
    Path(document_id): Path<String>,
    Query(query): Query<DocumentsQuery>,
) -> Response {
    if !valid_fingerprint(&query.fingerprint) {
        return api_error(StatusCode::BAD_REQUEST, "invalid fingerprint");
    }

    let filter = format!("parent_id eq '{}'", document_id.replace('\'', ""));
    let mut chunks = match state.upstream.scan(&query.index, &filter).await {
        Ok(c) => c,
        Err(e) => return from_domain(e),
    };

    if chunks.is_empty() {
        return api_error(StatusCode::NOT_FOUND, "no document with that id");
    }
    if chunks
        .iter()
        .any(|c| c.owner_fingerprint.as_deref() != Some(query.fingerprint.as_str()))
    {
        return api_error(
            StatusCode::FORBIDDEN,
            "document is not owned by the requesting fingerprint",
        );
    }

    chunks.sort_by_key(|c| c.chunk_index);
    let hits: Vec<serde_json::Value> = chunks
        .iter()
        .map(|c| {
            serde_json::json!({
                "chunk_id": c.chunk_id,
                "parent_id": c.parent_id,
                "chunk_index": c.chunk_index,
                "title": c.title,
                "text": c.text,
                "citation": c.citation,
                "source": c.source,
                "owner_fingerprint": c.owner_fingerprint,
                "score": 0.0,
            })
        })
        .collect();
    Json(serde_json::json!({ "hits": hits })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /documents/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_document(
    State(state): State<ProxyState>,
    Path(document_id): Path<String>,
    Query(query): Query<DocumentsQuery>,
) -> Response {
    if !valid_fingerprint(&query.fingerprint) {
        return api_error(StatusCode::BAD_REQUEST, "invalid fingerprint");
    }

    let filter = format!("parent_id eq '{}'", document_id.replace('\'', ""));
    let chunks = match state.upstream.scan(&query.index, &filter).await {
        Ok(c) => c,
        Err(e) => return from_domain(e),
    };

    if chunks.is_empty() {
        return api_error(StatusCode::NOT_FOUND, "no document with that id");
    }

    if let Some(foreign) = chunks
        .iter()
        .find(|c| c.owner_fingerprint.as_deref() != Some(query.fingerprint.as_str()))
    {
        tracing::warn!(
            document_id = %document_id,
            chunk_id = %foreign.chunk_id,
            "rejected delete of foreign document"
        );
        return api_error(
            StatusCode::FORBIDDEN,
            "document is not owned by the requesting fingerprint",
        );
    }

    let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
    match state.upstream.delete(&query.index, &ids).await {
        Ok(()) => Json(serde_json::json!({ "deleted": ids.len() })).into_response(),
        Err(e) => from_domain(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
