//! Turn execution loop.
//!
//! One logical task per active turn: it loads history, streams the model,
//! dispatches tool rounds, and persists committed rows. The returned
//! channel is the normalized event stream; `done` and `error` are mutually
//! exclusive terminals, and a cancelled turn ends without either.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use rg_domain::error::Error;
use rg_domain::stream::StreamEvent;
use rg_domain::turn::{ToolCall, Turn};
use rg_providers::{ChatRequest, LlmProvider};
use rg_retrieval::ToolContext;

use crate::runtime::agents::AgentBinding;
use crate::runtime::cancel::CancelToken;
use crate::runtime::truncate_str;
use crate::state::AppState;

/// Tool-result previews in the event stream stay short; the model sees the
/// full text through the conversation, the client only needs a summary.
const RESULT_PREVIEW_CHARS: usize = 600;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent — the client-facing event vocabulary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Assistant text delta. Concatenated in order, these equal the final
    /// assistant text.
    #[serde(rename = "text")]
    Text { text: String },

    /// Model reasoning delta, only when the provider streams it.
    #[serde(rename = "reasoning")]
    Reasoning { text: String },

    /// The model requested a tool.
    #[serde(rename = "tool_use")]
    ToolUse {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },

    /// The tool started, with its resolved inputs (model arguments plus
    /// the injected index binding).
    #[serde(rename = "tool_executing")]
    ToolExecuting {
        call_id: String,
        tool_name: String,
        resolved_inputs: Value,
    },

    /// The tool finished; `summary` is a truncated preview.
    #[serde(rename = "tool_result")]
    ToolResult {
        call_id: String,
        tool_name: String,
        summary: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// Non-fatal condition (queued turn, persistence failure, round cap).
    #[serde(rename = "warning")]
    Warning { message: String },

    /// Post-turn quota counter snapshot.
    #[serde(rename = "quota_update")]
    QuotaUpdate { used: u32, limit: Option<u32> },

    /// Terminal failure. Mutually exclusive with `done`.
    #[serde(rename = "error")]
    Error {
        classification: String,
        message: String,
    },

    /// Terminal success, with citations extracted from the final text.
    #[serde(rename = "done")]
    Done { citations: Vec<String> },
}

/// Input to one turn.
pub struct TurnInput {
    pub conversation_id: String,
    pub user_text: String,
    pub agent: Arc<AgentBinding>,
    pub fingerprint: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn — spawn the loop, return the event stream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one turn. Acquires the conversation lock (emitting a `warning` if
/// it has to queue), registers a cancel token, and enforces the soft turn
/// timeout. The receiver yields events until a terminal or cancellation.
pub fn run_turn(state: AppState, input: TurnInput) -> (CancelToken, mpsc::Receiver<TurnEvent>) {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);
    let cancel = CancelToken::new();
    let cancel_for_task = cancel.clone();

    let span = tracing::info_span!(
        "turn",
        conversation_id = %input.conversation_id,
        agent = %input.agent.name,
    );

    tokio::spawn(
        async move {
            let conversation_id = input.conversation_id.clone();

            if state.locks.is_busy(&conversation_id) {
                let _ = tx
                    .send(TurnEvent::Warning {
                        message: "a turn is already in progress; this message is queued".into(),
                    })
                    .await;
            }
            let _permit = state.locks.acquire(&conversation_id).await;

            let timeout = Duration::from_secs(state.config.limits.turn_timeout_s);
            let result = tokio::time::timeout(
                timeout,
                run_turn_inner(&state, &input, &tx, &cancel_for_task),
            )
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "turn failed");
                    let _ = tx
                        .send(TurnEvent::Error {
                            classification: e.classification().into(),
                            message: user_message(&e),
                        })
                        .await;
                }
                Err(_) => {
                    tracing::warn!(timeout_s = timeout.as_secs(), "turn timed out");
                    let _ = tx
                        .send(TurnEvent::Error {
                            classification: "timeout".into(),
                            message: format!("turn exceeded the {}s limit", timeout.as_secs()),
                        })
                        .await;
                }
            }
        }
        .instrument(span),
    );

    (cancel, rx)
}

/// User-visible message: the classification plus a short description, no
/// provider internals.
fn user_message(e: &Error) -> String {
    match e {
        Error::RateLimited(_) => "the model is rate limited; please retry shortly".into(),
        Error::Transient(_) | Error::Http(_) => "a transient upstream failure persisted".into(),
        Error::Persistence(_) => "conversation history could not be read".into(),
        other => other.to_string(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_turn_inner — the round loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    input: &TurnInput,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) -> Result<(), Error> {
    let agent = &input.agent;

    // History read failures are fatal: the prompt cannot be composed.
    let mut turns = state.turns.load_turns(&input.conversation_id)?;
    let mut next_seq = turns.len() as u64;

    // The user turn commits immediately; an aborted round later leaves it
    // in place.
    let user_turn = Turn::user(next_seq, &input.user_text);
    next_seq += 1;
    persist_or_warn(state, &input.conversation_id, std::slice::from_ref(&user_turn), tx).await;
    turns.push(user_turn);

    let tool_defs = state.catalog.definitions_for(&agent.config);
    let ctx = ToolContext {
        index_name: agent.search_index.clone(),
        fingerprint: input.fingerprint.clone(),
        conversation_id: input.conversation_id.clone(),
    };

    let max_rounds = state.config.limits.max_tool_rounds;

    for round in 0..=max_rounds {
        let tools_enabled = round < max_rounds;
        if !tools_enabled {
            tracing::warn!(max_rounds, "tool round limit reached, forcing synthesis");
            tx.send(TurnEvent::Warning {
                message: format!(
                    "tool round limit ({max_rounds}) reached; answering with what was gathered"
                ),
            })
            .await
            .ok();
        }

        if cancel.is_cancelled() {
            return Ok(());
        }

        let req = ChatRequest {
            system: agent.system_prompt.clone(),
            turns: turns.clone(),
            tools: if tools_enabled { tool_defs.clone() } else { Vec::new() },
            max_tokens: None,
            reasoning_budget: state.config.llm.reasoning_budget,
            model: Some(state.config.llm.model.clone()),
        };

        let round_out = stream_round(state, &req, tx, cancel).await?;
        if round_out.cancelled {
            // Partial round state is discarded; no terminal event.
            return Ok(());
        }

        // Final answer: no tool requests (or tools were disabled).
        if round_out.tool_calls.is_empty() || !tools_enabled {
            let assistant = Turn::assistant(next_seq, &round_out.text, &[]);
            persist_or_warn(state, &input.conversation_id, &[assistant], tx).await;

            let snapshot = state.quota.debit(&input.fingerprint);
            tx.send(TurnEvent::QuotaUpdate {
                used: snapshot.used,
                limit: snapshot.limit,
            })
            .await
            .ok();

            tx.send(TurnEvent::Done {
                citations: agent.extract_citations(&round_out.text),
            })
            .await
            .ok();
            return Ok(());
        }

        // ── Tool round ─────────────────────────────────────────────
        let assistant = Turn::assistant(next_seq, &round_out.text, &round_out.tool_calls);
        next_seq += 1;

        for tc in &round_out.tool_calls {
            tx.send(TurnEvent::ToolUse {
                call_id: tc.call_id.clone(),
                tool_name: tc.tool_name.clone(),
                arguments: tc.arguments.clone(),
            })
            .await
            .ok();
        }

        if cancel.is_cancelled() {
            return Ok(());
        }

        for tc in &round_out.tool_calls {
            // Resolved inputs: model arguments plus the injected binding.
            // The fingerprint is injected too but belongs to the session,
            // not the event stream.
            let mut resolved = tc.arguments.clone();
            if let Value::Object(ref mut map) = resolved {
                map.insert("index_name".into(), Value::String(ctx.index_name.clone()));
            }
            tx.send(TurnEvent::ToolExecuting {
                call_id: tc.call_id.clone(),
                tool_name: tc.tool_name.clone(),
                resolved_inputs: resolved,
            })
            .await
            .ok();
        }

        // Tools within one round run concurrently; results are collected
        // in request order so the event sequence stays deterministic.
        // Cancellation during dispatch abandons the round before any
        // result is emitted or persisted.
        let futures: Vec<_> = round_out
            .tool_calls
            .iter()
            .map(|tc| {
                let span = tracing::info_span!("tool", tool_name = %tc.tool_name);
                state
                    .catalog
                    .dispatch(&tc.tool_name, &tc.arguments, &ctx, &state.config.limits)
                    .instrument(span)
            })
            .collect();
        let outcomes = tokio::select! {
            outcomes = futures_util::future::join_all(futures) => outcomes,
            _ = cancel.cancelled() => return Ok(()),
        };

        let mut results = Vec::with_capacity(outcomes.len());
        for (tc, (content, is_error)) in round_out.tool_calls.iter().zip(outcomes) {
            tx.send(TurnEvent::ToolResult {
                call_id: tc.call_id.clone(),
                tool_name: tc.tool_name.clone(),
                summary: truncate_str(&content, RESULT_PREVIEW_CHARS),
                is_error,
            })
            .await
            .ok();
            results.push((tc.call_id.clone(), content, is_error));
        }

        let tool_turn = Turn::tool_results(next_seq, results);
        next_seq += 1;

        persist_or_warn(
            state,
            &input.conversation_id,
            &[assistant.clone(), tool_turn.clone()],
            tx,
        )
        .await;
        turns.push(assistant);
        turns.push(tool_turn);
    }

    // The synthesis round always returns above.
    debug_assert!(false, "round loop fell through");
    Err(Error::Invariant("turn loop exhausted without a terminal".into()))
}

/// Write failures downgrade to a warning: the turn continues, the next
/// turn's history may be short a round.
async fn persist_or_warn(
    state: &AppState,
    conversation_id: &str,
    rows: &[Turn],
    tx: &mpsc::Sender<TurnEvent>,
) {
    if let Err(e) = state.turns.append_turns(conversation_id, rows) {
        tracing::warn!(
            conversation_id,
            error = %e,
            "failed to persist turn rows"
        );
        tx.send(TurnEvent::Warning {
            message: "conversation history could not be saved; continuing".into(),
        })
        .await
        .ok();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// stream_round — one model invocation, with the retry schedule
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RoundOutput {
    text: String,
    tool_calls: Vec<ToolCall>,
    cancelled: bool,
}

/// Drive one completion to its end, forwarding deltas and assembling tool
/// calls. Rate-limited and transient failures retry on the policy
/// schedule, but only while nothing has been forwarded to the client —
/// after first output a retry would duplicate visible text, so the error
/// surfaces instead.
async fn stream_round(
    state: &AppState,
    req: &ChatRequest,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) -> Result<RoundOutput, Error> {
    let policy = &state.retry;
    let mut rate_step = 0usize;
    let mut transient_used = 0u32;

    loop {
        match consume_stream(state.llm.as_ref(), req, tx, cancel).await {
            Ok(out) => return Ok(out),
            Err((e, forwarded_any)) => {
                if forwarded_any {
                    return Err(e);
                }
                match &e {
                    Error::RateLimited(_) if rate_step < policy.rate_limit_delays.len() => {
                        let delay = policy.rate_limit_delays[rate_step];
                        rate_step += 1;
                        tracing::warn!(
                            attempt = rate_step,
                            delay_ms = delay.as_millis() as u64,
                            "model rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Error::Transient(_) | Error::Http(_) | Error::Timeout(_)
                        if transient_used < policy.transient_retries =>
                    {
                        transient_used += 1;
                        tracing::warn!(error = %e, "transient model failure, retrying");
                    }
                    _ => return Err(e),
                }
            }
        }
    }
}

async fn consume_stream(
    provider: &dyn LlmProvider,
    req: &ChatRequest,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) -> Result<RoundOutput, (Error, bool)> {
    let mut stream = provider.chat_stream(req).await.map_err(|e| (e, false))?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut forwarded_any = false;
    // call_id -> (name, args buffer), for providers that never send a
    // finished event for a block.
    let mut tc_bufs: std::collections::HashMap<String, (String, String)> =
        std::collections::HashMap::new();

    loop {
        let event = tokio::select! {
            next = stream.next() => match next {
                Some(event) => event,
                None => break,
            },
            _ = cancel.cancelled() => {
                return Ok(RoundOutput {
                    text,
                    tool_calls,
                    cancelled: true,
                });
            }
        };

        match event.map_err(|e| (e, forwarded_any))? {
            StreamEvent::Thinking { text: delta } => {
                forwarded_any = true;
                if tx.send(TurnEvent::Reasoning { text: delta }).await.is_err() {
                    return Ok(RoundOutput { text, tool_calls, cancelled: true });
                }
            }
            StreamEvent::Token { text: delta } => {
                forwarded_any = true;
                text.push_str(&delta);
                if tx.send(TurnEvent::Text { text: delta }).await.is_err() {
                    return Ok(RoundOutput { text, tool_calls, cancelled: true });
                }
            }
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                tc_bufs.insert(call_id, (tool_name, String::new()));
            }
            StreamEvent::ToolCallDelta { call_id, delta } => {
                if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                    args.push_str(&delta);
                }
            }
            StreamEvent::ToolCallFinished { call_id, tool_name, arguments } => {
                tc_bufs.remove(&call_id);
                tool_calls.push(ToolCall { call_id, tool_name, arguments });
            }
            StreamEvent::Done { .. } => break,
        }
    }

    // Assemble calls that went through start/delta but never finished.
    for (call_id, (tool_name, args_str)) in tc_bufs.drain() {
        let arguments = if args_str.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&args_str).unwrap_or_else(|e| {
                tracing::warn!(
                    call_id = %call_id,
                    tool = %tool_name,
                    error = %e,
                    "tool call arguments are not valid JSON; defaulting to empty object"
                );
                Value::Object(Default::default())
            })
        };
        tool_calls.push(ToolCall { call_id, tool_name, arguments });
    }

    Ok(RoundOutput {
        text,
        tool_calls,
        cancelled: cancel.is_cancelled(),
    })
}
