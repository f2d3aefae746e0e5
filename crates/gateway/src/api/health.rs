//! Liveness and agent-catalog endpoints.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /healthz
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "agents": state.agents.len(),
        "cache_enabled": state.config.cache.enabled,
        "tools": state.catalog.names(),
    }))
}

/// GET /v1/agents — the configured tenant catalog.
pub async fn agents(State(state): State<AppState>) -> impl IntoResponse {
    let agents: Vec<serde_json::Value> = state
        .agents
        .names()
        .into_iter()
        .filter_map(|name| state.agents.get(name))
        .map(|binding| {
            serde_json::json!({
                "name": binding.name,
                "index": binding.search_index,
                "tools": state
                    .catalog
                    .definitions_for(&binding.config)
                    .iter()
                    .map(|d| d.name.clone())
                    .collect::<Vec<_>>(),
            })
        })
        .collect();

    Json(serde_json::json!({ "agents": agents }))
}
