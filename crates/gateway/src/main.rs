use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rg_cache::{DocumentCache, Indexer};
use rg_conversations::{MemoStore, TurnStore};
use rg_domain::config::{Config, ConfigSeverity};
use rg_gateway::api;
use rg_gateway::auth::SharedSecretAuth;
use rg_gateway::pdf::LopdfExtractor;
use rg_gateway::runtime::agents::AgentRegistry;
use rg_gateway::runtime::conversation_lock::ConversationLockMap;
use rg_gateway::runtime::quota::DailyQuota;
use rg_gateway::state::AppState;
use rg_gateway::uploader::ProxyUploader;
use rg_providers::registry::ProviderRegistry;
use rg_providers::retry::RetryPolicy;
use rg_retrieval::sources::aps::ApsClient;
use rg_retrieval::sources::cfr::CfrClient;
use rg_retrieval::sources::drs::DrsClient;
use rg_retrieval::{build_catalog, RetrievalDeps};
use rg_search_client::SearchClient;

#[derive(Parser)]
#[command(name = "regulus", about = "Multi-tenant regulatory-assistance gateway")]
struct Cli {
    /// Path to the config file.
    #[arg(long, default_value = "config.toml")]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Validate the config file and exit.
    Validate,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = load_config(&cli.config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Validate) => {
            let config = load_config(&cli.config)?;
            let issues = config.validate();
            for issue in &issues {
                eprintln!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            println!("config ok");
            Ok(())
        }
        Some(Command::Version) => {
            println!("regulus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rg_gateway=debug")),
        )
        .json()
        .init();
}

fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("regulus starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Agents ───────────────────────────────────────────────────────
    let agents = Arc::new(AgentRegistry::from_config(&config).context("building agent registry")?);
    tracing::info!(agents = agents.len(), "agent registry ready");

    // ── Providers ────────────────────────────────────────────────────
    let providers =
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?;
    let llm = providers.chat();
    let embeddings = providers.embeddings().context("initializing embeddings provider")?;
    tracing::info!(
        provider = %llm.provider_id(),
        model = %config.llm.model,
        "LLM provider ready"
    );

    // ── Conversations & cache ────────────────────────────────────────
    let turns = Arc::new(
        TurnStore::new(&config.server.state_path).context("initializing turn store")?,
    );
    let memos = Arc::new(MemoStore::new());
    let cache =
        Arc::new(DocumentCache::new(&config.cache).context("initializing document cache")?);

    // ── Search proxy clients ─────────────────────────────────────────
    // The user-facing client carries no regulatory-writer credential; the
    // indexer's uploader gets its own credentialed instance.
    let search = Arc::new(
        SearchClient::new(&config.search_proxy.url).context("initializing search client")?,
    );
    let writer_client = {
        let client =
            SearchClient::new(&config.search_proxy.url).context("initializing writer client")?;
        match std::env::var(&config.search_proxy.regulatory_writer_env) {
            Ok(token) if !token.is_empty() => client.with_regulatory_writer(token),
            _ => {
                tracing::warn!(
                    env_var = %config.search_proxy.regulatory_writer_env,
                    "regulatory-writer credential not set; regulatory indexing will be rejected"
                );
                client
            }
        }
    };

    // ── Background indexer ───────────────────────────────────────────
    let indexer = Indexer::new(
        &config.index,
        cache.clone(),
        embeddings.clone(),
        Arc::new(ProxyUploader::new(writer_client)),
    );
    tracing::info!(
        auto_on_second_hit = config.index.auto_on_second_hit,
        jobs = config.index.max_concurrent_jobs,
        "indexer ready"
    );

    // ── Regulatory adapters + tool catalog ───────────────────────────
    let cfr = Arc::new(CfrClient::from_config(&config.sources.cfr).context("cfr adapter")?);
    let drs = Arc::new(DrsClient::from_config(&config.sources.drs).context("drs adapter")?);
    let aps = Arc::new(ApsClient::from_config(&config.sources.aps).context("aps adapter")?);
    let catalog = Arc::new(build_catalog(&RetrievalDeps {
        cache: cache.clone(),
        indexer: indexer.clone(),
        search: search.clone(),
        embeddings: embeddings.clone(),
        memos: memos.clone(),
        cfr,
        drs,
        aps,
        auto_index_on_second_hit: config.index.auto_on_second_hit,
    }));
    tracing::info!(tools = catalog.names().len(), "tool catalog ready");

    // ── Locks, quota, auth ───────────────────────────────────────────
    let locks = Arc::new(ConversationLockMap::new());
    let quota = Arc::new(DailyQuota::new(&config.quota));
    let auth = Arc::new(SharedSecretAuth::from_env(&config.server.api_token_env));

    let state = AppState {
        config: config.clone(),
        agents,
        llm,
        embeddings,
        retry: RetryPolicy::default(),
        catalog,
        cache,
        indexer,
        search,
        turns,
        memos,
        locks: locks.clone(),
        auth,
        quota,
        pdf: Arc::new(LopdfExtractor),
    };

    // ── Periodic lock pruning ────────────────────────────────────────
    {
        let locks = locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                locks.prune_idle();
            }
        });
    }

    // ── Bind ─────────────────────────────────────────────────────────
    let app = api::router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "regulus listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}
