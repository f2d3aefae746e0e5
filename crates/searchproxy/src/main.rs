mod api;
mod config;
mod upstream;

use std::sync::Arc;

use anyhow::Context;
use axum::routing::{delete, get, post};
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use rg_providers::embeddings::OpenAiEmbeddings;

use crate::api::ProxyState;
use crate::config::ProxyConfig;
use crate::upstream::VectorIndexClient;

#[derive(Parser)]
#[command(name = "regulus-searchproxy", about = "Vector-index proxy with enforced tenant isolation")]
struct Cli {
    /// Path to the proxy config file.
    #[arg(long, default_value = "searchproxy.toml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rg_searchproxy=debug")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let cfg = ProxyConfig::load(&cli.config).context("loading proxy config")?;

    let upstream = Arc::new(VectorIndexClient::new(&cfg.upstream).context("initializing index client")?);
    let embeddings = Arc::new(
        OpenAiEmbeddings::from_config(&cfg.query_embeddings, &cfg.embeddings)
            .context("initializing query embeddings")?,
    );

    let writer_token_hash = match std::env::var(&cfg.regulatory_writer_env) {
        Ok(token) if !token.is_empty() => {
            tracing::info!("regulatory-writer credential loaded");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env_var = %cfg.regulatory_writer_env,
                "regulatory writes DISABLED — writer credential not set"
            );
            None
        }
    };

    let state = ProxyState {
        upstream,
        embedding_dim: cfg.embeddings.dim,
        embeddings,
        writer_token_hash,
    };

    let app = axum::Router::new()
        .route("/search", post(api::search))
        .route("/index", post(api::index))
        .route("/documents", get(api::list_documents))
        .route("/documents/:id/chunks", get(api::document_chunks))
        .route("/documents/:id", delete(api::delete_document))
        .route("/healthz", get(|| async { "ok" }))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "search proxy listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
