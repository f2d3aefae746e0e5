//! Anthropic-native adapter.
//!
//! Implements the Messages API with streaming, tool use, and optional
//! extended thinking. The system prompt goes in the top-level `system`
//! field; tool results travel as user messages with `tool_result` blocks.

use serde_json::Value;

use rg_domain::config::ProviderConfig;
use rg_domain::error::{Error, Result};
use rg_domain::stream::{BoxStream, StreamEvent, Usage};
use rg_domain::turn::{Block, Role, ToolDefinition, Turn};

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::{classify_status, from_reqwest, resolve_api_key};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &ProviderConfig, request_timeout_ms: u64) -> Result<Self> {
        let api_key = match &cfg.api_key_env {
            Some(env_var) => resolve_api_key(env_var)?,
            None => return Err(Error::Auth(format!("provider '{}': api_key_env not set", cfg.id))),
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(request_timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg
                .default_model
                .clone()
                .unwrap_or_else(|| "claude-sonnet-4-20250514".into()),
            client,
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());

        let messages: Vec<Value> = req.turns.iter().map(turn_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
            "max_tokens": req.max_tokens.unwrap_or(8192),
        });

        if !req.system.is_empty() {
            body["system"] = Value::String(req.system.clone());
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_anthropic).collect());
        }
        if req.reasoning_budget > 0 {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": req.reasoning_budget,
            });
        }

        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn turn_to_anthropic(turn: &Turn) -> Value {
    // Tool turns become user messages with tool_result blocks.
    let role = match turn.role {
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    };

    let content: Vec<Value> = turn
        .blocks
        .iter()
        .map(|block| match block {
            Block::Text { text } => serde_json::json!({
                "type": "text",
                "text": text,
            }),
            Block::ToolUse { id, name, input } => serde_json::json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": input,
            }),
            Block::ToolResult { tool_use_id, content, is_error } => serde_json::json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            }),
        })
        .collect();

    serde_json::json!({ "role": role, "content": content })
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State carried across SSE payloads while assembling content blocks.
struct StreamState {
    /// block index -> (call_id, tool_name, argument buffer)
    active_tool_calls: std::collections::HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
    done_emitted: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            active_tool_calls: std::collections::HashMap::new(),
            usage: None,
            done_emitted: false,
        }
    }
}

/// Parse one SSE data payload into zero or more stream events.
fn parse_sse(data: &str, state: &mut StreamState) -> Vec<Result<StreamEvent>> {
    let mut events = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            events.push(Err(Error::Json(e)));
            return events;
        }
    };

    match v.get("type").and_then(|t| t.as_str()).unwrap_or("") {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                state.usage = msg.get("usage").and_then(parse_usage);
            }
        }

        "content_block_start" => {
            let idx = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if let Some(block) = v.get("content_block") {
                if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                    let call_id = str_field(block, "id");
                    let name = str_field(block, "name");
                    events.push(Ok(StreamEvent::ToolCallStarted {
                        call_id: call_id.clone(),
                        tool_name: name.clone(),
                    }));
                    state.active_tool_calls.insert(idx, (call_id, name, String::new()));
                }
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if let Some(delta) = v.get("delta") {
                match delta.get("type").and_then(|t| t.as_str()).unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|t| t.as_str()) {
                            if !text.is_empty() {
                                events.push(Ok(StreamEvent::Token { text: text.into() }));
                            }
                        }
                    }
                    "thinking_delta" => {
                        if let Some(text) = delta.get("thinking").and_then(|t| t.as_str()) {
                            if !text.is_empty() {
                                events.push(Ok(StreamEvent::Thinking { text: text.into() }));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(|p| p.as_str()) {
                            if let Some(tc) = state.active_tool_calls.get_mut(&idx) {
                                tc.2.push_str(partial);
                                events.push(Ok(StreamEvent::ToolCallDelta {
                                    call_id: tc.0.clone(),
                                    delta: partial.into(),
                                }));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
            if let Some((call_id, tool_name, args_str)) = state.active_tool_calls.remove(&idx) {
                let arguments: Value =
                    serde_json::from_str(&args_str).unwrap_or(Value::Object(Default::default()));
                events.push(Ok(StreamEvent::ToolCallFinished {
                    call_id,
                    tool_name,
                    arguments,
                }));
            }
        }

        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|t| t.as_u64())
            {
                if let Some(ref mut u) = state.usage {
                    u.output_tokens = output as u32;
                }
            }
            if let Some(stop) = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|s| s.as_str())
            {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    stop_reason: Some(stop.to_string()),
                }));
            }
        }

        "message_stop" => {
            if !state.done_emitted {
                state.done_emitted = true;
                events.push(Ok(StreamEvent::Done {
                    usage: state.usage.clone(),
                    stop_reason: Some("end_turn".into()),
                }));
            }
        }

        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown streaming error");
            let kind = v
                .get("error")
                .and_then(|e| e.get("type"))
                .and_then(|t| t.as_str())
                .unwrap_or("");
            events.push(Err(match kind {
                "rate_limit_error" => Error::RateLimited(msg.into()),
                "overloaded_error" => Error::Transient(msg.into()),
                _ => Error::Provider(msg.into()),
            }));
        }

        // ping and unknown event types
        _ => {}
    }

    events
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        input_tokens: v.get("input_tokens")?.as_u64()? as u32,
        output_tokens: v.get("output_tokens").and_then(|t| t.as_u64()).unwrap_or(0) as u32,
    })
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(|s| s.as_str()).unwrap_or("").to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(req);

        tracing::debug!(provider = %self.id, url = %url, "anthropic stream request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.unwrap_or_default();
            return Err(classify_status(&self.id, status.as_u16(), &err_text));
        }

        let mut state = StreamState::new();
        Ok(crate::sse::sse_response_stream(resp, move |data| {
            parse_sse(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_domain::turn::ToolCall;

    #[test]
    fn tool_turn_serializes_as_user_tool_result() {
        let turn = Turn::tool_results(2, vec![("tc_9".into(), "section text".into(), false)]);
        let v = turn_to_anthropic(&turn);
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "tool_result");
        assert_eq!(v["content"][0]["tool_use_id"], "tc_9");
    }

    #[test]
    fn assistant_turn_serializes_tool_use_blocks() {
        let calls = vec![ToolCall {
            call_id: "tc_1".into(),
            tool_name: "search_indexed_content".into(),
            arguments: serde_json::json!({"query": "25.1309"}),
        }];
        let v = turn_to_anthropic(&Turn::assistant(1, "checking", &calls));
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"][1]["type"], "tool_use");
        assert_eq!(v["content"][1]["name"], "search_indexed_content");
    }

    #[test]
    fn parse_text_and_thinking_deltas() {
        let mut state = StreamState::new();
        let events = parse_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#,
            &mut state,
        );
        assert!(matches!(&events[0], Ok(StreamEvent::Thinking { text }) if text == "hmm"));

        let events = parse_sse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
            &mut state,
        );
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "hi"));
    }

    #[test]
    fn parse_tool_call_lifecycle() {
        let mut state = StreamState::new();
        let started = parse_sse(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"tc_1","name":"fetch_cfr_section"}}"#,
            &mut state,
        );
        assert!(matches!(&started[0], Ok(StreamEvent::ToolCallStarted { call_id, .. }) if call_id == "tc_1"));

        parse_sse(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"title\":14}"}}"#,
            &mut state,
        );
        let finished = parse_sse(r#"{"type":"content_block_stop","index":1}"#, &mut state);
        match &finished[0] {
            Ok(StreamEvent::ToolCallFinished { call_id, arguments, .. }) => {
                assert_eq!(call_id, "tc_1");
                assert_eq!(arguments["title"], 14);
            }
            other => panic!("expected ToolCallFinished, got {other:?}"),
        }
    }

    #[test]
    fn parse_rate_limit_error_event() {
        let mut state = StreamState::new();
        let events = parse_sse(
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
            &mut state,
        );
        assert!(matches!(&events[0], Err(Error::RateLimited(_))));
    }

    #[test]
    fn message_stop_without_delta_emits_done_once() {
        let mut state = StreamState::new();
        let events = parse_sse(r#"{"type":"message_stop"}"#, &mut state);
        assert!(matches!(&events[0], Ok(StreamEvent::Done { .. })));
        assert!(parse_sse(r#"{"type":"message_stop"}"#, &mut state).is_empty());
    }
}
