//! The chat WebSocket — the duplex channel carrying one conversation.
//!
//! Open with `GET /v1/chat/ws?agent=<name>&token=<credential>&conversation_id=<id>`.
//! Inbound frames are `{"message": "..."}` user turns or `{"type":"cancel"}`.
//! Outbound frames are the turn events plus a periodic `{"type":"ping"}`
//! keep-alive the client must ignore.
//!
//! Close codes: 1000 clean, 4001 auth required/invalid, 4003 quota
//! exhausted, 1011 internal. Auth closes must not be auto-reconnected.

use std::borrow::Cow;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::runtime::cancel::CancelToken;
use crate::runtime::{run_turn, TurnEvent, TurnInput};
use crate::state::AppState;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_AUTH: u16 = 4001;
pub const CLOSE_QUOTA: u16 = 4003;
pub const CLOSE_INTERNAL: u16 = 1011;

const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    /// Opaque bearer credential from the fingerprint service.
    pub token: Option<String>,
    /// Agent selector, e.g. "faa-agent".
    pub agent: Option<String>,
    /// Conversation to resume; a fresh id is minted when absent.
    pub conversation_id: Option<String>,
}

/// One inbound client frame.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    frame_type: Option<String>,
}

pub async fn chat_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(socket: WebSocket, state: AppState, query: ChatQuery) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // ── Authenticate before any turn work ─────────────────────────
    let fingerprint = match state.auth.authenticate(query.token.as_deref().unwrap_or("")) {
        Ok(fp) => fp,
        Err(e) => {
            tracing::debug!(error = %e, "websocket auth rejected");
            close(&mut ws_sink, CLOSE_AUTH, "authentication required or invalid").await;
            return;
        }
    };

    let Some(agent) = query.agent.as_deref().and_then(|name| state.agents.get(name)) else {
        close(&mut ws_sink, CLOSE_INTERNAL, "unknown agent").await;
        return;
    };

    // Quota exhaustion on entry closes before any turn work.
    if state.quota.check(&fingerprint).is_err() {
        close(&mut ws_sink, CLOSE_QUOTA, "daily quota exhausted").await;
        return;
    }

    let conversation_id = query
        .conversation_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(
        conversation_id = %conversation_id,
        agent = %agent.name,
        "chat channel open"
    );

    // One outbound channel feeds the sink: turn events, pings, closes.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if ws_sink.send(msg).await.is_err() || is_close {
                break;
            }
        }
    });

    // Keep-alive pings; the client ignores them.
    let ping_tx = out_tx.clone();
    let pinger = tokio::spawn(async move {
        let mut tick = tokio::time::interval(PING_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            if ping_tx
                .send(Message::Text(r#"{"type":"ping"}"#.into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // ── Reader loop ───────────────────────────────────────────────
    // Tokens of every turn this channel started, so disconnect and
    // explicit cancel reach queued turns too.
    let mut turn_tokens: Vec<CancelToken> = Vec::new();

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => {
                let frame: InboundFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(_) => {
                        tracing::debug!("ignoring unparseable inbound frame");
                        continue;
                    }
                };

                if frame.frame_type.as_deref() == Some("cancel") {
                    for token in turn_tokens.drain(..) {
                        token.cancel();
                    }
                    continue;
                }

                let Some(user_text) = frame.message.filter(|m| !m.trim().is_empty()) else {
                    continue;
                };

                // Pre-turn quota check: exhaustion closes the channel.
                if state.quota.check(&fingerprint).is_err() {
                    let _ = out_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: CLOSE_QUOTA,
                            reason: Cow::from("daily quota exhausted"),
                        })))
                        .await;
                    break;
                }

                let input = TurnInput {
                    conversation_id: conversation_id.clone(),
                    user_text,
                    agent: agent.clone(),
                    fingerprint: fingerprint.clone(),
                };
                let (cancel, mut events) = run_turn(state.clone(), input);
                turn_tokens.push(cancel);

                // Forward this turn's events; queued turns each get their
                // own forwarder and serialize on the conversation lock.
                let forward_tx = out_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::warn!(error = %e, "failed to serialize turn event");
                                continue;
                            }
                        };
                        if forward_tx.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                });
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }

    // ── Disconnect: cancel in-flight work, drop per-conversation state ──
    for token in turn_tokens {
        token.cancel();
    }
    state.memos.drop_conversation(&conversation_id);
    pinger.abort();
    drop(out_tx);
    let _ = writer.await;

    tracing::info!(conversation_id = %conversation_id, "chat channel closed");
}

/// Serialize a turn event for the wire (used by tests to pin the format).
pub fn event_frame(event: &TurnEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| r#"{"type":"error"}"#.into())
}

async fn close(
    sink: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &'static str,
) {
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: Cow::from(reason),
        })))
        .await;
}
