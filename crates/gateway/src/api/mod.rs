//! HTTP surface of the gateway.

pub mod chat;
pub mod documents;
pub mod health;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::state::AppState;

pub fn router(state: AppState) -> axum::Router {
    let upload_limit =
        state.config.limits.personal_docs.max_size_mb as usize * 1024 * 1024 + 64 * 1024;

    axum::Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/agents", get(health::agents))
        .route("/v1/chat/ws", get(chat::chat_ws))
        .route("/v1/documents", post(documents::upload).get(documents::list))
        .route("/v1/documents/:id", delete(documents::delete))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(build_cors_layer(&state.config.server.cors))
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            state.config.server.max_concurrent_requests,
        ))
        .with_state(state)
}

/// CORS from the configured origin list. `"*"` allows everything; a
/// trailing `:*` matches any port on that host (the remainder must be
/// digits, so `http://localhost:3000.evil.com` cannot sneak through).
fn build_cors_layer(cors: &rg_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();
    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin_str = origin.to_str().unwrap_or("");
            wildcard_prefixes.iter().any(|prefix| {
                origin_str
                    .strip_prefix(prefix.as_str())
                    .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
            })
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
