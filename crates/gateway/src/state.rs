use std::sync::Arc;

use rg_cache::{DocumentCache, Indexer};
use rg_conversations::{MemoStore, TurnStore};
use rg_domain::config::Config;
use rg_providers::retry::RetryPolicy;
use rg_providers::{EmbeddingsProvider, LlmProvider};
use rg_retrieval::ToolCatalog;
use rg_search_client::SearchClient;

use crate::auth::FingerprintAuth;
use crate::pdf::PdfExtractor;
use crate::runtime::agents::AgentRegistry;
use crate::runtime::conversation_lock::ConversationLockMap;
use crate::runtime::quota::QuotaGate;

/// Shared application state passed to all handlers and the turn loop.
#[derive(Clone)]
pub struct AppState {
    // ── Configuration & tenants ───────────────────────────────────────
    pub config: Arc<Config>,
    pub agents: Arc<AgentRegistry>,

    // ── Model access ──────────────────────────────────────────────────
    pub llm: Arc<dyn LlmProvider>,
    pub embeddings: Arc<dyn EmbeddingsProvider>,
    pub retry: RetryPolicy,

    // ── Retrieval fabric ──────────────────────────────────────────────
    pub catalog: Arc<ToolCatalog>,
    pub cache: Arc<DocumentCache>,
    pub indexer: Arc<Indexer>,
    pub search: Arc<SearchClient>,

    // ── Conversation state ────────────────────────────────────────────
    pub turns: Arc<TurnStore>,
    pub memos: Arc<MemoStore>,
    pub locks: Arc<ConversationLockMap>,

    // ── External collaborators ────────────────────────────────────────
    pub auth: Arc<dyn FingerprintAuth>,
    pub quota: Arc<dyn QuotaGate>,
    pub pdf: Arc<dyn PdfExtractor>,
}
