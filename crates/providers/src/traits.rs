use rg_domain::error::Result;
use rg_domain::stream::{BoxStream, StreamEvent};
use rg_domain::turn::{ToolDefinition, Turn};

/// A provider-agnostic streaming completion request.
///
/// Prior turns — including tool results — are conveyed as conversation
/// history; the system prompt travels separately because some providers
/// (Anthropic) keep it out of the message array.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    /// Tool definitions the model may invoke. Empty = tools disabled.
    pub tools: Vec<ToolDefinition>,
    /// Maximum output tokens. `None` lets the adapter choose.
    pub max_tokens: Option<u32>,
    /// Extended-reasoning token budget. 0 disables reasoning.
    pub reasoning_budget: u32,
    /// Model override. `None` = adapter default.
    pub model: Option<String>,
}

/// Trait every streaming completion adapter implements.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a streaming completion and return the event stream.
    async fn chat_stream(&self, req: &ChatRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}

/// Trait for the fixed embeddings provider backing the vector corpus.
#[async_trait::async_trait]
pub trait EmbeddingsProvider: Send + Sync {
    /// Embed each input text. Output vectors all have [`dim`](Self::dim)
    /// components, in input order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dim(&self) -> usize;
}
