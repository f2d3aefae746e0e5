use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while consuming a streaming completion (provider-agnostic).
///
/// The orchestrator is the single consumer; it forwards these to the client
/// as normalized turn events and assembles the pending assistant turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Extended-reasoning delta, only when the provider supports it.
    #[serde(rename = "thinking")]
    Thinking { text: String },

    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// A tool-use block has opened.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted { call_id: String, tool_name: String },

    /// Incremental tool-call argument JSON.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta { call_id: String, delta: String },

    /// A tool-use block is complete with parsed arguments.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// The completion finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        stop_reason: Option<String>,
    },
}

/// Token usage for one completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
