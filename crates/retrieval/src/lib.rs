//! The retrieval tool catalog.
//!
//! Every tool is a pure function over `(model arguments, injected context)
//! -> String`. The string is the model-facing result: bounded, readable,
//! with explicit truncation markers. Tool failures become `Error: ...`
//! result text — they are never fatal to a turn.
//!
//! Context injection happens at the dispatch seam: a tool declares which
//! contextual slots it consumes via [`ContextNeeds`], and the dispatcher
//! fills them from the turn's agent binding and authenticated fingerprint.
//! The model cannot supply either value.

pub mod sources;
pub mod tools;

mod catalog;
mod util;

pub use catalog::{build_catalog, RetrievalDeps, ToolCatalog};
pub use util::truncate_marked;

use std::time::Duration;

use rg_domain::config::LimitsConfig;
use rg_domain::error::Result;
use rg_domain::turn::ToolDefinition;

/// Injected per-call context. Built by the orchestrator from the turn,
/// never from model arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The agent's vector-index namespace.
    pub index_name: String,
    /// The authenticated visitor fingerprint.
    pub fingerprint: String,
    /// Scopes the personal-document memo.
    pub conversation_id: String,
}

/// Which injected slots a tool consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextNeeds {
    pub index: bool,
    pub fingerprint: bool,
}

impl ContextNeeds {
    pub const INDEX: Self = Self { index: true, fingerprint: false };
    pub const FINGERPRINT: Self = Self { index: false, fingerprint: true };
    pub const BOTH: Self = Self { index: true, fingerprint: true };
}

/// One entry in the fixed tool catalog.
#[async_trait::async_trait]
pub trait RetrievalTool: Send + Sync {
    /// The definition shown to the model. Parameters only cover
    /// model-supplied inputs.
    fn definition(&self) -> ToolDefinition;

    /// Contextual slots the dispatcher must fill.
    fn needs(&self) -> ContextNeeds;

    /// Tools in the slow class (personal-document reassembly and search)
    /// get the longer timeout.
    fn slow(&self) -> bool {
        false
    }

    async fn invoke(&self, args: &serde_json::Value, ctx: &ToolContext) -> Result<String>;
}

/// Resolve the timeout for one tool from the limit config.
pub(crate) fn tool_timeout(tool: &dyn RetrievalTool, limits: &LimitsConfig) -> Duration {
    if tool.slow() {
        Duration::from_secs(limits.slow_tool_timeout_s)
    } else {
        Duration::from_secs(limits.tool_timeout_s)
    }
}
