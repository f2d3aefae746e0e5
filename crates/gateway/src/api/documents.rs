//! Personal-document upload API.
//!
//! `POST /v1/documents` takes a multipart PDF plus the bearer credential;
//! the file is size- and count-limited, deduplicated by SHA-256 of the
//! bytes, extracted through the PDF boundary, chunked without overlap,
//! embedded, and indexed immediately — the uploader's intent is explicit,
//! so there is no second-hit wait.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use rg_cache::chunker::chunk_document;
use rg_domain::document::{content_hash, personal_key, Document, SourceKind};
use rg_domain::error::Error;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AgentQuery {
    pub agent: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn from_domain(e: Error) -> Response {
    let status = match &e {
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::Ownership(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Transient(_) | Error::Http(_) | Error::Timeout(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

/// Authenticated fingerprint from the Authorization header.
fn authenticate(state: &AppState, headers: &axum::http::HeaderMap) -> Result<String, Response> {
    let credential = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    state
        .auth
        .authenticate(credential)
        .map_err(|e| api_error(StatusCode::UNAUTHORIZED, e.to_string()))
}

fn resolve_index(state: &AppState, agent_name: &str) -> Result<String, Response> {
    state
        .agents
        .get(agent_name)
        .map(|a| a.search_index.clone())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("unknown agent '{agent_name}'")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<AgentQuery>,
    headers: axum::http::HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let fingerprint = match authenticate(&state, &headers) {
        Ok(fp) => fp,
        Err(resp) => return resp,
    };
    let index = match resolve_index(&state, &query.agent) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    // ── Pull the file (and optional title) out of the multipart body ──
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut title: Option<String> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or("").to_owned();
                match name.as_str() {
                    "file" => {
                        if title.is_none() {
                            title = field.file_name().map(str::to_owned);
                        }
                        match field.bytes().await {
                            Ok(bytes) => file_bytes = Some(bytes.to_vec()),
                            Err(e) => {
                                return api_error(
                                    StatusCode::PAYLOAD_TOO_LARGE,
                                    format!("upload failed: {e}"),
                                )
                            }
                        }
                    }
                    "title" => {
                        if let Ok(text) = field.text().await {
                            if !text.trim().is_empty() {
                                title = Some(text);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(e) => return api_error(StatusCode::BAD_REQUEST, format!("bad multipart body: {e}")),
        }
    }

    let Some(bytes) = file_bytes else {
        return api_error(StatusCode::BAD_REQUEST, "missing 'file' field");
    };

    // ── Limits ─────────────────────────────────────────────────────
    let max_bytes = state.config.limits.personal_docs.max_size_mb as usize * 1024 * 1024;
    if bytes.len() > max_bytes {
        return api_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "file exceeds the {} MB limit",
                state.config.limits.personal_docs.max_size_mb
            ),
        );
    }
    if !crate::pdf::looks_like_pdf(&bytes) {
        return api_error(StatusCode::BAD_REQUEST, "only PDF uploads are supported");
    }

    let existing = match state.search.list_documents(&fingerprint, &index).await {
        Ok(docs) => docs,
        Err(e) => return from_domain(e),
    };

    // Dedup on the raw file bytes: the same PDF uploaded twice is a 409,
    // even when the account is at its document limit.
    let file_hash = content_hash(&bytes);
    if existing
        .iter()
        .any(|d| d.file_hash.as_deref() == Some(file_hash.as_str()))
    {
        return api_error(StatusCode::CONFLICT, "this file is already uploaded");
    }

    if existing.len() >= state.config.limits.personal_docs.max_per_user as usize {
        return api_error(
            StatusCode::TOO_MANY_REQUESTS,
            format!(
                "document limit reached ({} per user)",
                state.config.limits.personal_docs.max_per_user
            ),
        );
    }

    // ── Extract text through the PDF boundary ─────────────────────
    let pdf = state.pdf.clone();
    let extracted = match tokio::task::spawn_blocking(move || pdf.extract(&bytes)).await {
        Ok(Ok(extracted)) => extracted,
        Ok(Err(e)) => return api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("extraction task failed: {e}")),
    };

    let document_id = personal_key(&fingerprint, &uuid::Uuid::new_v4());
    let title = title.unwrap_or_else(|| document_id.clone());

    let document = Document {
        doc_id: document_id.clone(),
        source: SourceKind::Personal,
        title: title.clone(),
        body: extracted.text,
        citation: title.clone(),
        owner_fingerprint: Some(fingerprint.clone()),
        page_count: extracted.page_count,
        content_hash: file_hash,
        cached_at: chrono::Utc::now(),
        hit_count: 0,
        indexed: false,
        indexed_at: None,
    };

    if let Err(e) = state.cache.put(SourceKind::Personal, &document_id, &document) {
        tracing::warn!(error = %e, "failed to cache personal document");
    }

    // ── Chunk, embed, index — immediately ─────────────────────────
    let mut chunks = chunk_document(&document);
    if chunks.is_empty() {
        return api_error(StatusCode::UNPROCESSABLE_ENTITY, "document has no indexable text");
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = match state.embeddings.embed(&texts).await {
        Ok(v) => v,
        Err(e) => return from_domain(e),
    };
    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.embedding = vector;
    }
    let chunk_count = chunks.len();

    if let Err(e) = state
        .search
        .index_documents(&index, Some(&fingerprint), &chunks)
        .await
    {
        return from_domain(e);
    }
    if let Err(e) =
        state
            .cache
            .mark_indexed(SourceKind::Personal, &document_id, chrono::Utc::now())
    {
        tracing::warn!(error = %e, "failed to mark personal document indexed");
    }

    tracing::info!(
        document_id = %document_id,
        pages = document.page_count,
        chunks = chunk_count,
        "personal document uploaded and indexed"
    );

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "document_id": document_id,
            "title": title,
            "page_count": document.page_count,
            "chunk_count": chunk_count,
        })),
    )
        .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<AgentQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    let fingerprint = match authenticate(&state, &headers) {
        Ok(fp) => fp,
        Err(resp) => return resp,
    };
    let index = match resolve_index(&state, &query.agent) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state.search.list_documents(&fingerprint, &index).await {
        Ok(documents) => Json(serde_json::json!({ "documents": documents })).into_response(),
        Err(e) => from_domain(e),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/documents/{id}
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(query): Query<AgentQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    let fingerprint = match authenticate(&state, &headers) {
        Ok(fp) => fp,
        Err(resp) => return resp,
    };
    let index = match resolve_index(&state, &query.agent) {
        Ok(i) => i,
        Err(resp) => return resp,
    };

    match state
        .search
        .delete_document(&document_id, &fingerprint, &index)
        .await
    {
        Ok(()) => Json(serde_json::json!({ "deleted": document_id })).into_response(),
        Err(e) => from_domain(e),
    }
}
