use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Completion adapter id (e.g. "anthropic").
    #[serde(default = "d_anthropic")]
    pub provider: String,
    /// Model identifier passed to the adapter.
    #[serde(default = "d_model")]
    pub model: String,
    /// Token budget for optional extended reasoning. 0 disables it.
    #[serde(default)]
    pub reasoning_budget: u32,
    #[serde(default = "d_120000u")]
    pub request_timeout_ms: u64,
    /// Registered provider endpoints (adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: d_anthropic(),
            model: d_model(),
            reasoning_budget: 0,
            request_timeout_ms: d_120000u(),
            providers: Vec::new(),
            embeddings: EmbeddingsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Env var holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompat,
}

/// Embedding provider binding. The dimensionality is fixed: every chunk in
/// every index carries a vector of this size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default = "d_embed_provider")]
    pub provider: String,
    #[serde(default = "d_embed_model")]
    pub model: String,
    #[serde(default = "d_1024")]
    pub dim: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: d_embed_provider(),
            model: d_embed_model(),
            dim: d_1024(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_anthropic() -> String {
    "anthropic".into()
}
fn d_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_120000u() -> u64 {
    120_000
}
fn d_embed_provider() -> String {
    "embeddings".into()
}
fn d_embed_model() -> String {
    "text-embedding-3-large".into()
}
fn d_1024() -> usize {
    1024
}
