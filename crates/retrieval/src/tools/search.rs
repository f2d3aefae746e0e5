//! `search_indexed_content` — semantic search over the tenant-visible
//! slice of the vector corpus.

use std::sync::Arc;

use rg_domain::error::Result;
use rg_domain::turn::ToolDefinition;
use rg_search_client::{SearchClient, SearchRequest};

use crate::util::{str_arg, truncate_marked};
use crate::{ContextNeeds, RetrievalTool, ToolContext};

/// Keep each excerpt readable; the ranked list stays bounded overall.
const EXCERPT_CHARS: usize = 700;

pub struct SearchIndexedContent {
    search: Arc<SearchClient>,
}

impl SearchIndexedContent {
    pub fn new(search: Arc<SearchClient>) -> Self {
        Self { search }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for SearchIndexedContent {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_indexed_content".into(),
            description: "Semantic search over previously indexed regulatory material and \
                          your own uploads. Returns ranked excerpts with citations."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Natural-language search query" },
                    "top": { "type": "integer", "description": "Max results (default 8)" }
                },
                "required": ["query"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::BOTH
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let query = match str_arg(args, "query") {
            Ok(q) => q,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        let top = args.get("top").and_then(|v| v.as_u64()).unwrap_or(8) as usize;

        let hits = self
            .search
            .search(&SearchRequest {
                query,
                index: ctx.index_name.clone(),
                fingerprint: ctx.fingerprint.clone(),
                top: top.clamp(1, 20),
            })
            .await?;

        if hits.is_empty() {
            return Ok("No indexed content matched the query. Consider fetching the source \
                       document directly."
                .into());
        }

        let mut out = String::new();
        for (rank, hit) in hits.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} [{}]\n{}\n\n",
                rank + 1,
                hit.title,
                if hit.citation.is_empty() { &hit.source } else { &hit.citation },
                truncate_marked(&hit.text, EXCERPT_CHARS),
            ));
        }
        Ok(out.trim_end().to_owned())
    }
}
