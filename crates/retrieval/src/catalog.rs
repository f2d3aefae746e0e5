//! Catalog construction and dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use rg_cache::{DocumentCache, Indexer};
use rg_conversations::MemoStore;
use rg_domain::config::{AgentConfig, LimitsConfig};
use rg_domain::error::Error;
use rg_domain::turn::ToolDefinition;
use rg_providers::EmbeddingsProvider;
use rg_search_client::SearchClient;

use crate::sources::aps::ApsClient;
use crate::sources::cfr::CfrClient;
use crate::sources::drs::DrsClient;
use crate::tools;
use crate::{tool_timeout, RetrievalTool, ToolContext};

/// Everything the catalog's tools are built over.
pub struct RetrievalDeps {
    pub cache: Arc<DocumentCache>,
    pub indexer: Arc<Indexer>,
    pub search: Arc<SearchClient>,
    pub embeddings: Arc<dyn EmbeddingsProvider>,
    pub memos: Arc<MemoStore>,
    pub cfr: Arc<CfrClient>,
    pub drs: Arc<DrsClient>,
    pub aps: Arc<ApsClient>,
    pub auto_index_on_second_hit: bool,
}

/// The process-wide, read-only tool catalog.
pub struct ToolCatalog {
    tools: BTreeMap<String, Arc<dyn RetrievalTool>>,
}

/// Build the fixed catalog. Per-agent subsets are carved out at
/// definition time via [`ToolCatalog::definitions_for`].
pub fn build_catalog(deps: &RetrievalDeps) -> ToolCatalog {
    let auto = deps.auto_index_on_second_hit;
    let entries: Vec<Arc<dyn RetrievalTool>> = vec![
        Arc::new(tools::search::SearchIndexedContent::new(deps.search.clone())),
        Arc::new(tools::cfr::FetchCfrSection::new(
            deps.cfr.clone(),
            deps.cache.clone(),
            deps.indexer.clone(),
            auto,
        )),
        Arc::new(tools::drs::SearchDrs::new(deps.drs.clone())),
        Arc::new(tools::drs::FetchDrsDocument::new(
            deps.drs.clone(),
            deps.cache.clone(),
            deps.indexer.clone(),
            auto,
        )),
        Arc::new(tools::aps::SearchAps::new(deps.aps.clone())),
        Arc::new(tools::aps::FetchApsDocument::new(
            deps.aps.clone(),
            deps.cache.clone(),
            deps.indexer.clone(),
            auto,
        )),
        Arc::new(tools::personal::ListMyDocuments::new(deps.search.clone())),
        Arc::new(tools::personal::FetchPersonalDocument::new(
            deps.search.clone(),
            deps.memos.clone(),
        )),
        Arc::new(tools::personal::SearchPersonalDocument::new(
            deps.search.clone(),
            deps.memos.clone(),
            deps.embeddings.clone(),
        )),
        Arc::new(tools::personal::DeleteMyDocument::new(
            deps.search.clone(),
            deps.memos.clone(),
        )),
    ];

    ToolCatalog {
        tools: entries
            .into_iter()
            .map(|t| (t.definition().name, t))
            .collect(),
    }
}

impl ToolCatalog {
    /// Definitions exposed to the model for one agent, filtered by its
    /// enabled-tool list.
    pub fn definitions_for(&self, agent: &AgentConfig) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|t| agent.allows_tool(&t.definition().name))
            .map(|t| t.definition())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Execute one tool call. Returns `(result text, is_error)`.
    ///
    /// Every failure mode lands in the result string: unknown tools,
    /// malformed arguments, timeouts, and upstream errors are all text the
    /// model can read and recover from. Nothing here aborts a turn.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        args: &serde_json::Value,
        ctx: &ToolContext,
        limits: &LimitsConfig,
    ) -> (String, bool) {
        let Some(tool) = self.tools.get(tool_name) else {
            return (
                format!("Error: unknown tool '{tool_name}'. Available tools: {}",
                    self.tools.keys().cloned().collect::<Vec<_>>().join(", ")),
                true,
            );
        };

        let timeout = tool_timeout(tool.as_ref(), limits);
        let invoked = tokio::time::timeout(timeout, tool.invoke(args, ctx)).await;

        match invoked {
            Ok(Ok(text)) => {
                let is_error = text.starts_with("Error:");
                (text, is_error)
            }
            Ok(Err(Error::NotFound(msg))) => (format!("No document found: {msg}"), true),
            Ok(Err(Error::Timeout(msg))) => {
                (format!("Error: upstream timeout, please retry ({msg})"), true)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = tool_name, error = %e, "tool failed");
                (format!("Error: {e}"), true)
            }
            Err(_) => (
                format!(
                    "Error: tool '{tool_name}' timed out after {}s",
                    timeout.as_secs()
                ),
                true,
            ),
        }
    }
}
