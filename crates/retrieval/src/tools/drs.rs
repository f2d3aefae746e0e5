//! FAA DRS tools: `search_drs` and `fetch_drs_document`.

use std::sync::Arc;

use rg_cache::{DocumentCache, Indexer};
use rg_domain::document::SourceKind;
use rg_domain::error::Result;
use rg_domain::turn::ToolDefinition;

use crate::sources::drs::DrsClient;
use crate::tools::fetch_through_cache;
use crate::util::{str_arg, truncate_marked};
use crate::{ContextNeeds, RetrievalTool, ToolContext};

/// DRS bodies are truncated around 15k chars for the model.
const BODY_CHARS: usize = 15_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search_drs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct SearchDrs {
    drs: Arc<DrsClient>,
}

impl SearchDrs {
    pub fn new(drs: Arc<DrsClient>) -> Self {
        Self { drs }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for SearchDrs {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_drs".into(),
            description: "Search the FAA Dynamic Regulatory System for advisory circulars, \
                          orders, policy and guidance documents. Returns document GUIDs \
                          usable with fetch_drs_document."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search terms" },
                    "doc_type": { "type": "string", "description": "Optional family filter, e.g. \"AC\"" }
                },
                "required": ["query"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::INDEX
    }

    async fn invoke(&self, args: &serde_json::Value, _ctx: &ToolContext) -> Result<String> {
        let query = match str_arg(args, "query") {
            Ok(q) => q,
            Err(e) => return Ok(format!("Error: {e}")),
        };
        let doc_type = args.get("doc_type").and_then(|v| v.as_str());

        let results = self.drs.search(&query, doc_type).await?;
        if results.is_empty() {
            return Ok(format!("No DRS documents matched '{query}'."));
        }

        let mut out = String::new();
        for r in &results {
            out.push_str(&format!(
                "- {} [{}] guid={} date={}\n",
                r.title, r.doc_type, r.guid, r.date
            ));
        }
        Ok(out.trim_end().to_owned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// fetch_drs_document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct FetchDrsDocument {
    drs: Arc<DrsClient>,
    cache: Arc<DocumentCache>,
    indexer: Arc<Indexer>,
    auto_index: bool,
}

impl FetchDrsDocument {
    pub fn new(
        drs: Arc<DrsClient>,
        cache: Arc<DocumentCache>,
        indexer: Arc<Indexer>,
        auto_index: bool,
    ) -> Self {
        Self { drs, cache, indexer, auto_index }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for FetchDrsDocument {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_drs_document".into(),
            description: "Fetch the complete text of one FAA DRS document by GUID and \
                          document type."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "document_guid": { "type": "string", "description": "DRS document GUID" },
                    "doc_type": { "type": "string", "description": "Document family, e.g. \"AC\"" }
                },
                "required": ["document_guid", "doc_type"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::INDEX
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let (guid, doc_type) = match (str_arg(args, "document_guid"), str_arg(args, "doc_type")) {
            (Ok(g), Ok(d)) => (g, d),
            (Err(e), _) | (_, Err(e)) => return Ok(format!("Error: {e}")),
        };

        let local_id = format!("{doc_type}-{guid}");
        let drs = self.drs.clone();
        let (g, d) = (guid.clone(), doc_type.clone());

        let doc = fetch_through_cache(
            &self.cache,
            &self.indexer,
            self.auto_index,
            SourceKind::Drs,
            &local_id,
            &ctx.index_name,
            move || async move { drs.fetch(&d, &g).await },
        )
        .await?;

        Ok(format!(
            "# {} ({})\n\n{}",
            doc.title,
            doc.citation,
            truncate_marked(&doc.body, BODY_CHARS)
        ))
    }
}
