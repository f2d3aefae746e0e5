//! Personal-document tools: list, fetch, search-within, delete.
//!
//! Personal uploads live only in the vector index (and the per-turn memo);
//! fetch reassembles the body by listing the fingerprint's chunks for the
//! document and concatenating in chunk order. Search embeds the query and
//! the document's paragraphs and ranks by cosine similarity.

use std::sync::Arc;

use rg_conversations::MemoStore;
use rg_domain::error::{Error, Result};
use rg_domain::turn::ToolDefinition;
use rg_providers::embeddings::cosine_similarity;
use rg_providers::EmbeddingsProvider;
use rg_search_client::SearchClient;

use crate::util::str_arg;
use crate::{ContextNeeds, RetrievalTool, ToolContext};

/// fetch_personal_document returns at most this much body text.
const FETCH_CHARS: usize = 50_000;
/// search_personal_document returns at most this much passage text.
const SEARCH_CHARS: usize = 10_000;
/// Paragraphs embedded per search call; very long documents search their
/// head, the marker tells the model so.
const MAX_PARAGRAPHS: usize = 256;
const TOP_PASSAGES: usize = 5;

const TRUNCATION_HINT: &str =
    "\n\n...truncated... The document continues past this point — ask me to search the \
     remainder with search_personal_document.";

/// Reassemble a personal document's full text from its indexed chunks,
/// serving from the conversation memo when warm.
async fn reassemble(
    search: &SearchClient,
    memos: &MemoStore,
    ctx: &ToolContext,
    document_id: &str,
) -> Result<(String, String)> {
    let memo_key = MemoStore::key(document_id);
    if let Some(text) = memos.get(&ctx.conversation_id, &memo_key) {
        let title = memos
            .get(&ctx.conversation_id, &format!("{memo_key}_title"))
            .unwrap_or_else(|| document_id.to_owned());
        return Ok((title, text));
    }

    let mut chunks = search
        .get_document_chunks(document_id, &ctx.fingerprint, &ctx.index_name)
        .await?;
    if chunks.is_empty() {
        return Err(Error::NotFound(format!("no personal document '{document_id}'")));
    }
    chunks.sort_by_key(|c| c.chunk_index);

    let title = chunks[0].title.clone();
    let body = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    memos.put(&ctx.conversation_id, memo_key.clone(), body.clone());
    memos.put(&ctx.conversation_id, format!("{memo_key}_title"), title.clone());
    Ok((title, body))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list_my_documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ListMyDocuments {
    search: Arc<SearchClient>,
}

impl ListMyDocuments {
    pub fn new(search: Arc<SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for ListMyDocuments {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_my_documents".into(),
            description: "List the user's uploaded documents: id, title, pages, upload time."
                .into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::BOTH
    }

    async fn invoke(&self, _args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let docs = self
            .search
            .list_documents(&ctx.fingerprint, &ctx.index_name)
            .await?;

        if docs.is_empty() {
            return Ok("No uploaded documents.".into());
        }

        let mut out = String::new();
        for d in &docs {
            out.push_str(&format!(
                "- id={} \"{}\" pages={} uploaded={}\n",
                d.document_id, d.title, d.page_count, d.uploaded_at
            ));
        }
        Ok(out.trim_end().to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// fetch_personal_document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FetchPersonalDocument {
    search: Arc<SearchClient>,
    memos: Arc<MemoStore>,
}

impl FetchPersonalDocument {
    pub fn new(search: Arc<SearchClient>, memos: Arc<MemoStore>) -> Self {
        Self { search, memos }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for FetchPersonalDocument {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_personal_document".into(),
            description: "Read the full text of one of the user's uploaded documents by id \
                          (see list_my_documents)."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "document_id": { "type": "string", "description": "Document id" }
                },
                "required": ["document_id"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::BOTH
    }

    fn slow(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let document_id = match str_arg(args, "document_id") {
            Ok(id) => id,
            Err(e) => return Ok(format!("Error: {e}")),
        };

        let (title, body) = reassemble(&self.search, &self.memos, ctx, &document_id).await?;

        if body.len() <= FETCH_CHARS {
            return Ok(format!("# {title}\n\n{body}"));
        }
        let mut end = FETCH_CHARS;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        Ok(format!("# {title}\n\n{}{TRUNCATION_HINT}", &body[..end]))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search_personal_document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SearchPersonalDocument {
    search: Arc<SearchClient>,
    memos: Arc<MemoStore>,
    embeddings: Arc<dyn EmbeddingsProvider>,
}

impl SearchPersonalDocument {
    pub fn new(
        search: Arc<SearchClient>,
        memos: Arc<MemoStore>,
        embeddings: Arc<dyn EmbeddingsProvider>,
    ) -> Self {
        Self { search, memos, embeddings }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for SearchPersonalDocument {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_personal_document".into(),
            description: "Semantic search within one uploaded document. Returns the best \
                          matching paragraphs with surrounding context."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "document_id": { "type": "string", "description": "Document id" },
                    "query": { "type": "string", "description": "What to look for" }
                },
                "required": ["document_id", "query"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::BOTH
    }

    fn slow(&self) -> bool {
        true
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let (document_id, query) = match (str_arg(args, "document_id"), str_arg(args, "query")) {
            (Ok(d), Ok(q)) => (d, q),
            (Err(e), _) | (_, Err(e)) => return Ok(format!("Error: {e}")),
        };

        let (_, body) = reassemble(&self.search, &self.memos, ctx, &document_id).await?;

        let paragraphs = split_paragraphs(&body);
        if paragraphs.is_empty() {
            return Ok("The document contains no searchable text.".into());
        }
        let capped = paragraphs.len() > MAX_PARAGRAPHS;
        let paragraphs = &paragraphs[..paragraphs.len().min(MAX_PARAGRAPHS)];

        let mut inputs = Vec::with_capacity(paragraphs.len() + 1);
        inputs.push(query.clone());
        inputs.extend(paragraphs.iter().map(|p| p.to_string()));
        let vectors = self.embeddings.embed(&inputs).await?;
        let (query_vec, para_vecs) = vectors.split_first().ok_or_else(|| {
            Error::Provider("embeddings returned an empty batch".into())
        })?;

        let mut ranked: Vec<(usize, f32)> = para_vecs
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query_vec, v)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let passages = select_with_context(paragraphs, &ranked, TOP_PASSAGES);
        let mut out = passages.join("\n\n---\n\n");
        if out.len() > SEARCH_CHARS {
            let mut end = SEARCH_CHARS;
            while !out.is_char_boundary(end) {
                end -= 1;
            }
            out.truncate(end);
            out.push_str("\n\n...truncated...");
        }
        if capped {
            out.push_str("\n\n(Only the first part of this large document was searched.)");
        }
        Ok(out)
    }
}

fn split_paragraphs(body: &str) -> Vec<&str> {
    body.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Expand each top-ranked paragraph by one neighbor on each side, merging
/// windows that touch.
fn select_with_context(paragraphs: &[&str], ranked: &[(usize, f32)], top: usize) -> Vec<String> {
    let mut windows: Vec<(usize, usize)> = ranked
        .iter()
        .take(top)
        .map(|&(i, _)| (i.saturating_sub(1), (i + 1).min(paragraphs.len() - 1)))
        .collect();
    windows.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (start, end) in windows {
        match merged.last_mut() {
            Some((_, last_end)) if start <= *last_end + 1 => *last_end = (*last_end).max(end),
            _ => merged.push((start, end)),
        }
    }

    merged
        .into_iter()
        .map(|(start, end)| paragraphs[start..=end].join("\n\n"))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// delete_my_document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct DeleteMyDocument {
    search: Arc<SearchClient>,
    memos: Arc<MemoStore>,
}

impl DeleteMyDocument {
    pub fn new(search: Arc<SearchClient>, memos: Arc<MemoStore>) -> Self {
        Self { search, memos }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for DeleteMyDocument {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "delete_my_document".into(),
            description: "Permanently delete one of the user's uploaded documents by id.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "document_id": { "type": "string", "description": "Document id" }
                },
                "required": ["document_id"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::BOTH
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let document_id = match str_arg(args, "document_id") {
            Ok(id) => id,
            Err(e) => return Ok(format!("Error: {e}")),
        };

        self.search
            .delete_document(&document_id, &ctx.fingerprint, &ctx.index_name)
            .await?;

        // Stale memo text must not outlive the document.
        self.memos.drop_conversation(&ctx.conversation_id);

        Ok(format!("Deleted document {document_id}."))
    }
}
