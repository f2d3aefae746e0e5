//! NRC ADAMS tools: `search_aps` and `fetch_aps_document`.

use std::sync::Arc;

use rg_cache::{DocumentCache, Indexer};
use rg_domain::document::SourceKind;
use rg_domain::error::Result;
use rg_domain::turn::ToolDefinition;

use crate::sources::aps::ApsClient;
use crate::tools::fetch_through_cache;
use crate::util::{str_arg, truncate_marked};
use crate::{ContextNeeds, RetrievalTool, ToolContext};

const BODY_CHARS: usize = 15_000;

pub struct SearchAps {
    aps: Arc<ApsClient>,
}

impl SearchAps {
    pub fn new(aps: Arc<ApsClient>) -> Self {
        Self { aps }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for SearchAps {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_aps".into(),
            description: "Search the NRC ADAMS public library. Returns accession numbers \
                          usable with fetch_aps_document."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search terms" }
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

        let results = self.aps.search(&query).await?;
        if results.is_empty() {
            return Ok(format!("No ADAMS documents matched '{query}'."));
        }

        let mut out = String::new();
        for r in &results {
            out.push_str(&format!(
                "- {} [{}] accession={} date={}\n",
                r.title, r.doc_type, r.accession, r.date
            ));
        }
        Ok(out.trim_end().to_owned())
    }
}

pub struct FetchApsDocument {
    aps: Arc<ApsClient>,
    cache: Arc<DocumentCache>,
    indexer: Arc<Indexer>,
    auto_index: bool,
}

impl FetchApsDocument {
    pub fn new(
        aps: Arc<ApsClient>,
        cache: Arc<DocumentCache>,
        indexer: Arc<Indexer>,
        auto_index: bool,
    ) -> Self {
        Self { aps, cache, indexer, auto_index }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for FetchApsDocument {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_aps_document".into(),
            description: "Fetch the full text of one NRC ADAMS document by accession number \
                          (e.g. ML20239A111)."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "accession": { "type": "string", "description": "ADAMS accession number" }
                },
                "required": ["accession"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::INDEX
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let accession = match str_arg(args, "accession") {
            Ok(a) => a,
            Err(e) => return Ok(format!("Error: {e}")),
        };

        let aps = self.aps.clone();
        let acc = accession.clone();

        let doc = fetch_through_cache(
            &self.cache,
            &self.indexer,
            self.auto_index,
            SourceKind::Aps,
            &accession,
            &ctx.index_name,
            move || async move { aps.fetch(&acc).await },
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
