//! `fetch_cfr_section` — complete CFR section text, cache-backed.

use std::sync::Arc;

use rg_cache::{DocumentCache, Indexer};
use rg_domain::document::SourceKind;
use rg_domain::error::Result;
use rg_domain::turn::ToolDefinition;

use crate::sources::cfr::CfrClient;
use crate::tools::fetch_through_cache;
use crate::util::{str_arg, truncate_marked, u64_arg};
use crate::{ContextNeeds, RetrievalTool, ToolContext};

/// CFR sections run long but rarely this long; the marker tells the model
/// the tail exists.
const BODY_CHARS: usize = 30_000;

pub struct FetchCfrSection {
    cfr: Arc<CfrClient>,
    cache: Arc<DocumentCache>,
    indexer: Arc<Indexer>,
    auto_index: bool,
}

impl FetchCfrSection {
    pub fn new(
        cfr: Arc<CfrClient>,
        cache: Arc<DocumentCache>,
        indexer: Arc<Indexer>,
        auto_index: bool,
    ) -> Self {
        Self { cfr, cache, indexer, auto_index }
    }
}

#[async_trait::async_trait]
impl RetrievalTool for FetchCfrSection {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "fetch_cfr_section".into(),
            description: "Fetch the complete text of one CFR section, e.g. title 14, part 25, \
                          section 1309. Optionally at a past edition date."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": { "type": "integer", "description": "CFR title number, e.g. 14" },
                    "part": { "type": "integer", "description": "Part number, e.g. 25" },
                    "section": { "type": "string", "description": "Section, e.g. \"1309\"" },
                    "date": { "type": "string", "description": "Edition date YYYY-MM-DD (default: current)" }
                },
                "required": ["title", "part", "section"]
            }),
        }
    }

    fn needs(&self) -> ContextNeeds {
        ContextNeeds::INDEX
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let (title, part, section) = match (
            u64_arg(args, "title"),
            u64_arg(args, "part"),
            str_arg(args, "section"),
        ) {
            (Ok(t), Ok(p), Ok(s)) => (t as u32, p as u32, s),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                return Ok(format!("Error: {e}"))
            }
        };
        let date = args.get("date").and_then(|v| v.as_str()).map(str::to_owned);

        let local_id = format!("{title}-{part}-{section}");
        let cfr = self.cfr.clone();
        let section_for_fetch = section.clone();

        let doc = fetch_through_cache(
            &self.cache,
            &self.indexer,
            self.auto_index,
            SourceKind::Cfr,
            &local_id,
            &ctx.index_name,
            move || async move {
                cfr.fetch_section(title, part, &section_for_fetch, date.as_deref())
                    .await
            },
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
