use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted conversation turn: a role, an ordered list of structured
/// blocks, and a sequence number. Sequences within a conversation are
/// gap-free and strictly ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub sequence: u64,
    pub role: Role,
    pub blocks: Vec<Block>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Carries tool results back to the model.
    Tool,
}

/// Structured content inside a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Block {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A tool invocation the model requested (assembled from the stream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the model-supplied parameters. Injected context
    /// (index name, fingerprint) is never part of this schema.
    pub parameters: serde_json::Value,
}

// ── Convenience constructors ───────────────────────────────────────

impl Turn {
    pub fn user(sequence: u64, text: impl Into<String>) -> Self {
        Self {
            sequence,
            role: Role::User,
            blocks: vec![Block::Text { text: text.into() }],
            created_at: Utc::now(),
        }
    }

    /// Assistant turn from accumulated text plus any tool-use blocks.
    pub fn assistant(sequence: u64, text: &str, tool_calls: &[ToolCall]) -> Self {
        let mut blocks = Vec::new();
        if !text.is_empty() {
            blocks.push(Block::Text { text: text.to_owned() });
        }
        for tc in tool_calls {
            blocks.push(Block::ToolUse {
                id: tc.call_id.clone(),
                name: tc.tool_name.clone(),
                input: tc.arguments.clone(),
            });
        }
        Self {
            sequence,
            role: Role::Assistant,
            blocks,
            created_at: Utc::now(),
        }
    }

    /// A single tool turn carrying all results of one round.
    pub fn tool_results(sequence: u64, results: Vec<(String, String, bool)>) -> Self {
        Self {
            sequence,
            role: Role::Tool,
            blocks: results
                .into_iter()
                .map(|(tool_use_id, content, is_error)| Block::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                })
                .collect(),
            created_at: Utc::now(),
        }
    }

    /// Joined text of every text block.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool-use blocks reconstructed as calls.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::ToolUse { id, name, input } => Some(ToolCall {
                    call_id: id.clone(),
                    tool_name: name.clone(),
                    arguments: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}
