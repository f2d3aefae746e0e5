//! End-to-end turn-loop tests: a scripted LLM provider, an in-process
//! search-proxy/portal stub, and the real orchestrator, cache, indexer,
//! and tool catalog in between.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxPath, Query, State};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use rg_cache::{DocumentCache, Indexer};
use rg_conversations::{MemoStore, TurnStore};
use rg_domain::config::Config;
use rg_domain::document::{Chunk, SourceKind};
use rg_domain::error::Result as DomainResult;
use rg_domain::stream::{BoxStream, StreamEvent};
use rg_domain::turn::Role;
use rg_gateway::auth::SharedSecretAuth;
use rg_gateway::pdf::{ExtractedPdf, PdfExtractor};
use rg_gateway::runtime::agents::AgentRegistry;
use rg_gateway::runtime::conversation_lock::ConversationLockMap;
use rg_gateway::runtime::quota::DailyQuota;
use rg_gateway::runtime::{run_turn, TurnEvent, TurnInput};
use rg_gateway::state::AppState;
use rg_gateway::uploader::ProxyUploader;
use rg_providers::retry::RetryPolicy;
use rg_providers::{ChatRequest, EmbeddingsProvider, LlmProvider};
use rg_retrieval::sources::aps::ApsClient;
use rg_retrieval::sources::cfr::CfrClient;
use rg_retrieval::sources::drs::DrsClient;
use rg_retrieval::{build_catalog, RetrievalDeps, ToolContext};
use rg_search_client::SearchClient;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stub upstreams: search proxy + eCFR portal on one local server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Default)]
struct Stub {
    /// index name -> stored chunks
    chunks: Arc<Mutex<HashMap<String, Vec<Chunk>>>>,
    /// Recorded /search request bodies.
    search_requests: Arc<Mutex<Vec<Value>>>,
    /// Remaining 504s the CFR route serves before succeeding.
    cfr_failures: Arc<AtomicU32>,
    cfr_calls: Arc<AtomicU32>,
    cfr_delay_ms: Arc<AtomicU64>,
}

impl Stub {
    fn chunks_in(&self, index: &str) -> Vec<Chunk> {
        self.chunks.lock().get(index).cloned().unwrap_or_default()
    }
}

async fn stub_search(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.search_requests.lock().push(body.clone());
    let index = body["index"].as_str().unwrap_or("").to_owned();
    let fingerprint = body["fingerprint"].as_str().unwrap_or("").to_owned();
    let query = body["query"].as_str().unwrap_or("").to_lowercase();

    let hits: Vec<Value> = stub
        .chunks_in(&index)
        .iter()
        .filter(|c| {
            c.owner_fingerprint.is_none()
                || c.owner_fingerprint.as_deref() == Some(fingerprint.as_str())
        })
        .filter(|c| c.text.to_lowercase().contains(&query))
        .map(|c| {
            json!({
                "chunk_id": c.chunk_id,
                "parent_id": c.parent_id,
                "chunk_index": c.chunk_index,
                "title": c.title,
                "text": c.text,
                "citation": c.citation,
                "source": c.source,
                "owner_fingerprint": c.owner_fingerprint,
                "score": 1.0,
            })
        })
        .collect();
    Json(json!({ "hits": hits }))
}

async fn stub_index(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    let index = body["index"].as_str().unwrap_or("").to_owned();
    let docs: Vec<Chunk> =
        serde_json::from_value(body["documents"].clone()).expect("chunk batch decodes");
    let count = docs.len();
    stub.chunks.lock().entry(index).or_default().extend(docs);
    Json(json!({ "indexed": count }))
}

#[derive(serde::Deserialize)]
struct DocsQuery {
    fingerprint: String,
    index: String,
}

async fn stub_list(State(stub): State<Stub>, Query(q): Query<DocsQuery>) -> Json<Value> {
    let mut by_parent: HashMap<String, (Chunk, u32)> = HashMap::new();
    for c in stub
        .chunks_in(&q.index)
        .into_iter()
        .filter(|c| c.owner_fingerprint.as_deref() == Some(q.fingerprint.as_str()))
    {
        by_parent
            .entry(c.parent_id.clone())
            .and_modify(|(_, n)| *n += 1)
            .or_insert((c, 1));
    }
    let documents: Vec<Value> = by_parent
        .into_iter()
        .map(|(parent, (first, n))| {
            json!({
                "document_id": parent,
                "title": first.title,
                "page_count": first.page_count,
                "uploaded_at": first.uploaded_at.to_rfc3339(),
                "chunk_count": n,
                "file_hash": first.file_hash,
            })
        })
        .collect();
    Json(json!({ "documents": documents }))
}

async fn stub_doc_chunks(
    State(stub): State<Stub>,
    AxPath(id): AxPath<String>,
    Query(q): Query<DocsQuery>,
) -> impl IntoResponse {
    let mut chunks: Vec<Chunk> = stub
        .chunks_in(&q.index)
        .into_iter()
        .filter(|c| c.parent_id == id)
        .collect();
    if chunks.is_empty() {
        return (axum::http::StatusCode::NOT_FOUND, Json(json!({"error": "missing"})))
            .into_response();
    }
    if chunks
        .iter()
        .any(|c| c.owner_fingerprint.as_deref() != Some(q.fingerprint.as_str()))
    {
        return (axum::http::StatusCode::FORBIDDEN, Json(json!({"error": "foreign"})))
            .into_response();
    }
    chunks.sort_by_key(|c| c.chunk_index);
    let hits: Vec<Value> = chunks
        .iter()
        .map(|c| {
            json!({
                "chunk_id": c.chunk_id,
                "parent_id": c.parent_id,
                "chunk_index": c.chunk_index,
                "title": c.title,
                "text": c.text,
                "citation": c.citation,
                "source": c.source,
                "owner_fingerprint": c.owner_fingerprint,
                "score": 0.0,
            })
        })
        .collect();
    Json(json!({ "hits": hits })).into_response()
}

async fn stub_delete(
    State(stub): State<Stub>,
    AxPath(id): AxPath<String>,
    Query(q): Query<DocsQuery>,
) -> impl IntoResponse {
    let mut chunks = stub.chunks.lock();
    let Some(index_chunks) = chunks.get_mut(&q.index) else {
        return (axum::http::StatusCode::NOT_FOUND, Json(json!({"error": "missing"})))
            .into_response();
    };
    let before = index_chunks.len();
    index_chunks.retain(|c| c.parent_id != id);
    Json(json!({ "deleted": before - index_chunks.len() })).into_response()
}

#[derive(serde::Deserialize)]
struct CfrQuery {
    #[allow(dead_code)]
    part: String,
    section: String,
}

async fn stub_cfr(
    State(stub): State<Stub>,
    AxPath((_date, _file)): AxPath<(String, String)>,
    Query(q): Query<CfrQuery>,
) -> impl IntoResponse {
    stub.cfr_calls.fetch_add(1, Ordering::SeqCst);

    let delay = stub.cfr_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let remaining = stub.cfr_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        stub.cfr_failures.store(remaining - 1, Ordering::SeqCst);
        return (axum::http::StatusCode::GATEWAY_TIMEOUT, "upstream timeout").into_response();
    }

    let xml = format!(
        "<DIV8><HEAD>§ {s} Equipment, systems, and installations.</HEAD>\
         <P>(a) Equipment and systems must be designed to perform their intended \
         functions under foreseeable operating conditions.</P></DIV8>",
        s = q.section
    );
    xml.into_response()
}

/// Bind the stub server on an ephemeral port; returns its base URL.
async fn start_stub() -> (String, Stub) {
    let stub = Stub::default();
    let app = axum::Router::new()
        .route("/search", post(stub_search))
        .route("/index", post(stub_index))
        .route("/documents", get(stub_list))
        .route("/documents/:id/chunks", get(stub_doc_chunks))
        .route("/documents/:id", axum::routing::delete(stub_delete))
        .route("/api/versioner/v1/full/:date/:file", get(stub_cfr))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), stub)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted provider + mock embeddings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Script {
    Events(Vec<StreamEvent>),
    Delayed(Duration, Vec<StreamEvent>),
    Stall,
}

struct ScriptedProvider<F> {
    script: F,
    calls: AtomicU32,
}

impl<F> ScriptedProvider<F>
where
    F: Fn(&ChatRequest, u32) -> Script + Send + Sync,
{
    fn new(script: F) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait::async_trait]
impl<F> LlmProvider for ScriptedProvider<F>
where
    F: Fn(&ChatRequest, u32) -> Script + Send + Sync,
{
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> DomainResult<BoxStream<'static, DomainResult<StreamEvent>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.script)(req, call) {
            Script::Events(events) => Ok(Box::pin(futures_util::stream::iter(
                events.into_iter().map(Ok::<_, rg_domain::Error>),
            ))),
            Script::Delayed(delay, events) => {
                let stream = async_stream::stream! {
                    tokio::time::sleep(delay).await;
                    for event in events {
                        yield Ok::<_, rg_domain::Error>(event);
                    }
                };
                Ok(Box::pin(stream))
            }
            Script::Stall => Ok(Box::pin(
                futures_util::stream::pending::<DomainResult<StreamEvent>>(),
            )),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

struct MockEmbeddings;

#[async_trait::async_trait]
impl EmbeddingsProvider for MockEmbeddings {
    async fn embed(&self, inputs: &[String]) -> DomainResult<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|_| vec![0.25; 4]).collect())
    }
    fn dim(&self) -> usize {
        4
    }
}

struct FakePdf;

impl PdfExtractor for FakePdf {
    fn extract(&self, _bytes: &[u8]) -> DomainResult<ExtractedPdf> {
        Ok(ExtractedPdf {
            text: "maintenance manual section one torque the quantum flange to spec".into(),
            page_count: 3,
        })
    }
}

// ── Event-building helpers ─────────────────────────────────────────

fn done() -> StreamEvent {
    StreamEvent::Done {
        usage: None,
        stop_reason: Some("end_turn".into()),
    }
}

fn text_round(text: &str) -> Script {
    Script::Events(vec![
        StreamEvent::Token { text: text.into() },
        done(),
    ])
}

fn tool_round(calls: &[(&str, &str, Value)]) -> Script {
    let mut events = Vec::new();
    for (id, name, args) in calls {
        events.push(StreamEvent::ToolCallStarted {
            call_id: (*id).into(),
            tool_name: (*name).into(),
        });
        events.push(StreamEvent::ToolCallFinished {
            call_id: (*id).into(),
            tool_name: (*name).into(),
            arguments: args.clone(),
        });
    }
    events.push(done());
    Script::Events(events)
}

fn fetch_1309_args() -> Value {
    json!({"title": 14, "part": 25, "section": "1309"})
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Harness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Harness {
    state: AppState,
    stub: Stub,
    _dir: tempfile::TempDir,
}

fn test_config(base_url: &str, dir: &std::path::Path) -> Config {
    let config = format!(
        r#"
        [server]
        state_path = "{state}"

        [cache]
        path = "{cache}"

        [search_proxy]
        url = "{base}"
        indexes = ["faa-agent", "dod-agent"]

        [sources.cfr]
        base_url = "{base}"
        rate_per_sec = 1000

        [agents.faa-agent]
        index = "faa-agent"
        system_prompt = "You answer questions about FAA regulations."
        citation_patterns = ['\d+ CFR [\d.]+\d']

        [agents.dod-agent]
        index = "dod-agent"
        system_prompt = "You answer questions about defense acquisition regulations."
        "#,
        state = dir.join("state").display(),
        cache = dir.join("cache").display(),
        base = base_url,
    );
    toml::from_str(&config).unwrap()
}

async fn harness<F>(script: F) -> Harness
where
    F: Fn(&ChatRequest, u32) -> Script + Send + Sync + 'static,
{
    harness_with(script, |_| {}).await
}

async fn harness_with<F, C>(script: F, tweak: C) -> Harness
where
    F: Fn(&ChatRequest, u32) -> Script + Send + Sync + 'static,
    C: FnOnce(&mut Config),
{
    let (base_url, stub) = start_stub().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&base_url, dir.path());
    tweak(&mut config);
    let config = Arc::new(config);

    let embeddings: Arc<dyn EmbeddingsProvider> = Arc::new(MockEmbeddings);
    let cache = Arc::new(DocumentCache::new(&config.cache).unwrap());
    let search = Arc::new(SearchClient::new(&config.search_proxy.url).unwrap());
    let indexer = Indexer::new(
        &config.index,
        cache.clone(),
        embeddings.clone(),
        Arc::new(ProxyUploader::new(
            SearchClient::new(&config.search_proxy.url).unwrap(),
        )),
    );
    let memos = Arc::new(MemoStore::new());

    let catalog = Arc::new(build_catalog(&RetrievalDeps {
        cache: cache.clone(),
        indexer: indexer.clone(),
        search: search.clone(),
        embeddings: embeddings.clone(),
        memos: memos.clone(),
        cfr: Arc::new(CfrClient::from_config(&config.sources.cfr).unwrap()),
        drs: Arc::new(DrsClient::from_config(&config.sources.drs).unwrap()),
        aps: Arc::new(ApsClient::from_config(&config.sources.aps).unwrap()),
        auto_index_on_second_hit: config.index.auto_on_second_hit,
    }));

    let state = AppState {
        agents: Arc::new(AgentRegistry::from_config(&config).unwrap()),
        llm: ScriptedProvider::new(script),
        embeddings,
        retry: RetryPolicy::immediate(),
        catalog,
        cache,
        indexer,
        search,
        turns: Arc::new(TurnStore::new(&config.server.state_path).unwrap()),
        memos,
        locks: Arc::new(ConversationLockMap::new()),
        auth: Arc::new(SharedSecretAuth::open()),
        quota: Arc::new(DailyQuota::new(&config.quota)),
        pdf: Arc::new(FakePdf),
        config,
    };

    Harness {
        state,
        stub,
        _dir: dir,
    }
}

impl Harness {
    fn input(&self, conversation_id: &str, agent: &str, fingerprint: &str, text: &str) -> TurnInput {
        TurnInput {
            conversation_id: conversation_id.into(),
            user_text: text.into(),
            agent: self.state.agents.get(agent).unwrap(),
            fingerprint: fingerprint.into(),
        }
    }

    async fn run(&self, conversation_id: &str, agent: &str, fingerprint: &str, text: &str) -> Vec<TurnEvent> {
        let (_cancel, rx) = run_turn(self.state.clone(), self.input(conversation_id, agent, fingerprint, text));
        collect(rx).await
    }
}

async fn collect(mut rx: mpsc::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

// ── Event assertions ───────────────────────────────────────────────

fn assert_tool_triples(events: &[TurnEvent]) {
    for (i, event) in events.iter().enumerate() {
        if let TurnEvent::ToolUse { call_id, .. } = event {
            let executing = events.iter().position(|e| {
                matches!(e, TurnEvent::ToolExecuting { call_id: c, .. } if c == call_id)
            });
            let result = events.iter().position(|e| {
                matches!(e, TurnEvent::ToolResult { call_id: c, .. } if c == call_id)
            });
            let executing = executing.unwrap_or_else(|| panic!("no tool_executing for {call_id}"));
            let result = result.unwrap_or_else(|| panic!("no tool_result for {call_id}"));
            assert!(i < executing, "tool_use after tool_executing for {call_id}");
            assert!(executing < result, "tool_executing after tool_result for {call_id}");
        }
    }
}

fn terminal_of(events: &[TurnEvent]) -> &TurnEvent {
    let terminals: Vec<&TurnEvent> = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::Done { .. } | TurnEvent::Error { .. }))
        .collect();
    assert_eq!(terminals.len(), 1, "done and error are mutually exclusive terminals");
    terminals[0]
}

fn full_text(events: &[TurnEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn tool_result_summary(events: &[TurnEvent], id: &str) -> (String, bool) {
    events
        .iter()
        .find_map(|e| match e {
            TurnEvent::ToolResult { call_id, summary, is_error, .. } if call_id == id => {
                Some((summary.clone(), *is_error))
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("no tool_result for {id}"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenarios
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scenario: cold cache, search finds nothing, fetch pulls the section,
/// the answer streams, and the cache entry lands unindexed.
#[tokio::test]
async fn simple_question_cache_cold() {
    let h = harness(|_req, call| match call {
        0 => tool_round(&[("tc_1", "search_indexed_content", json!({"query": "25.1309"}))]),
        1 => tool_round(&[("tc_2", "fetch_cfr_section", fetch_1309_args())]),
        _ => text_round("Section 25.1309 requires equipment to perform as intended. (14 CFR 25.1309)"),
    })
    .await;

    let events = h.run("c1", "faa-agent", "fp1", "What does 14 CFR §25.1309 require?").await;

    assert_tool_triples(&events);
    let (search_result, _) = tool_result_summary(&events, "tc_1");
    assert!(search_result.contains("No indexed content matched"));
    let (fetch_result, is_error) = tool_result_summary(&events, "tc_2");
    assert!(!is_error);
    assert!(fetch_result.contains("must be designed"));
    assert!(full_text(&events).contains("25.1309"));

    match terminal_of(&events) {
        TurnEvent::Done { citations } => {
            assert!(citations.contains(&"14 CFR 25.1309".to_string()));
        }
        other => panic!("expected done, got {other:?}"),
    }

    // Cache has the entry, not yet promoted.
    let doc = h.state.cache.get(SourceKind::Cfr, "14-25-1309").unwrap().unwrap();
    assert_eq!(doc.hit_count, 0);
    assert!(!doc.indexed);
    assert!(h.stub.chunks_in("faa-agent").is_empty());
}

/// Scenario: a second retrieval in a different conversation promotes the
/// cached document into the agent's index with a null owner.
#[tokio::test]
async fn second_retrieval_promotes_to_index() {
    let h = harness(|req, _| {
        let last_is_tool = req.turns.last().map(|t| t.role == Role::Tool).unwrap_or(false);
        if last_is_tool {
            text_round("Answer.")
        } else {
            tool_round(&[("tc_f", "fetch_cfr_section", fetch_1309_args())])
        }
    })
    .await;

    h.run("c1", "faa-agent", "fp1", "What does 25.1309 require?").await;
    h.run("c2", "faa-agent", "fp2", "What does 25.1309 require?").await;

    // Background indexing settles.
    tokio::time::sleep(Duration::from_millis(400)).await;

    let doc = h.state.cache.get(SourceKind::Cfr, "14-25-1309").unwrap().unwrap();
    assert_eq!(doc.hit_count, 1);
    assert!(doc.indexed);

    let chunks = h.stub.chunks_in("faa-agent");
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.owner_fingerprint.is_none()));
    assert!(chunks.iter().all(|c| c.parent_id == "cfr/14-25-1309"));
}

/// Scenario: another tenant retrieving the same section reuses the single
/// cache entry but gets its own index build.
#[tokio::test]
async fn one_cache_entry_two_indices() {
    let h = harness(|req, _| {
        let last_is_tool = req.turns.last().map(|t| t.role == Role::Tool).unwrap_or(false);
        if last_is_tool {
            text_round("Answer.")
        } else {
            tool_round(&[("tc_f", "fetch_cfr_section", fetch_1309_args())])
        }
    })
    .await;

    h.run("c1", "faa-agent", "fp1", "q").await;
    h.run("c2", "faa-agent", "fp1", "q").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!h.stub.chunks_in("faa-agent").is_empty());
    assert!(h.stub.chunks_in("dod-agent").is_empty());

    h.run("c3", "dod-agent", "fp3", "q").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!h.stub.chunks_in("dod-agent").is_empty());
    // One upstream fetch per cache miss only: later turns were cache hits.
    assert_eq!(h.stub.cfr_calls.load(Ordering::SeqCst), 1);
    let doc = h.state.cache.get(SourceKind::Cfr, "14-25-1309").unwrap().unwrap();
    assert_eq!(doc.hit_count, 2);
}

/// The proxy filter is the privacy mechanism: another fingerprint cannot
/// see a personal document through search, its owner can.
#[tokio::test]
async fn personal_document_privacy() {
    let h = harness(|_req, call| match call {
        0 | 2 => tool_round(&[("tc_s", "search_indexed_content", json!({"query": "quantum flange"}))]),
        _ => text_round("Answer."),
    })
    .await;

    // U1's upload, already chunked + indexed.
    let owned = Chunk {
        chunk_id: "fp1-d1-0".into(),
        parent_id: "fp1-d1".into(),
        chunk_index: 0,
        title: "manual.pdf".into(),
        text: "torque the quantum flange to 42 inch-pounds".into(),
        citation: "manual.pdf".into(),
        source: SourceKind::Personal,
        owner_fingerprint: Some("fp1".into()),
        uploaded_at: chrono::Utc::now(),
        page_count: 3,
        file_hash: "h1".into(),
        embedding: vec![0.25; 4],
    };
    h.stub.chunks.lock().entry("faa-agent".into()).or_default().push(owned);

    let u2_events = h.run("c-u2", "faa-agent", "fp2", "search my docs").await;
    let (u2_result, _) = tool_result_summary(&u2_events, "tc_s");
    assert!(u2_result.contains("No indexed content matched"));

    let u1_events = h.run("c-u1", "faa-agent", "fp1", "search my docs").await;
    let (u1_result, _) = tool_result_summary(&u1_events, "tc_s");
    assert!(u1_result.contains("quantum flange"));
}

/// Injected context comes from the turn, never the model's arguments.
#[tokio::test]
async fn model_cannot_override_injected_context() {
    let h = harness(|_req, call| match call {
        0 => tool_round(&[(
            "tc_s",
            "search_indexed_content",
            json!({
                "query": "anything",
                "index_name": "dod-agent",
                "fingerprint": "someone-else",
            }),
        )]),
        _ => text_round("Answer."),
    })
    .await;

    h.run("c1", "faa-agent", "fp1", "q").await;

    let requests = h.stub.search_requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["index"], "faa-agent");
    assert_eq!(requests[0]["fingerprint"], "fp1");
}

/// Scenario: upstream 504 becomes a tool-visible error, the model retries
/// the same call, and the turn still completes.
#[tokio::test]
async fn tool_error_recovery() {
    let h = harness(|_req, call| match call {
        0 => tool_round(&[("tc_1", "fetch_cfr_section", fetch_1309_args())]),
        1 => tool_round(&[("tc_2", "fetch_cfr_section", fetch_1309_args())]),
        _ => text_round("Here is the section."),
    })
    .await;

    // First attempt and its one internal retry both 504.
    h.stub.cfr_failures.store(2, Ordering::SeqCst);

    let events = h.run("c1", "faa-agent", "fp1", "q").await;

    let (first, first_err) = tool_result_summary(&events, "tc_1");
    assert!(first_err);
    assert!(first.starts_with("Error:"));

    let (second, second_err) = tool_result_summary(&events, "tc_2");
    assert!(!second_err);
    assert!(second.contains("must be designed"));

    assert!(matches!(terminal_of(&events), TurnEvent::Done { .. }));
    // 2 failed calls (attempt + internal retry), then 1 success.
    assert_eq!(h.stub.cfr_calls.load(Ordering::SeqCst), 3);
}

/// Scenario: disconnect mid-fetch. The fetch observes cancellation
/// quickly, no terminal event fires, and only the user turn persisted.
#[tokio::test]
async fn cancellation_discards_the_round() {
    let h = harness(|_req, call| match call {
        0 => tool_round(&[("tc_1", "fetch_cfr_section", fetch_1309_args())]),
        _ => text_round("never reached"),
    })
    .await;
    h.stub.cfr_delay_ms.store(5_000, Ordering::SeqCst);

    let (cancel, mut rx) = run_turn(h.state.clone(), h.input("c1", "faa-agent", "fp1", "q"));

    // Wait for the tool to start, then pull the plug.
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        let is_executing = matches!(event, TurnEvent::ToolExecuting { .. });
        seen.push(event);
        if is_executing {
            break;
        }
    }
    let cancelled_at = std::time::Instant::now();
    cancel.cancel();

    let rest = collect(rx).await;
    assert!(cancelled_at.elapsed() < Duration::from_millis(500));
    seen.extend(rest);

    assert!(
        !seen.iter().any(|e| matches!(e, TurnEvent::Done { .. } | TurnEvent::Error { .. })),
        "cancelled turn must not emit a terminal"
    );

    let turns = h.state.turns.load_turns("c1").unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, Role::User);
}

/// Boundary: the round cap emits a warning and forces exactly one
/// tools-disabled synthesis round.
#[tokio::test]
async fn max_rounds_forces_synthesis() {
    let h = harness_with(
        |req, _| {
            if req.tools.is_empty() {
                text_round("Synthesis from gathered context.")
            } else {
                tool_round(&[("tc_n", "search_indexed_content", json!({"query": "more"}))])
            }
        },
        |config| config.limits.max_tool_rounds = 3,
    )
    .await;

    let events = h.run("c1", "faa-agent", "fp1", "q").await;

    let warnings: Vec<&TurnEvent> = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::Warning { .. }))
        .collect();
    assert_eq!(warnings.len(), 1);

    assert!(matches!(terminal_of(&events), TurnEvent::Done { .. }));
    assert!(full_text(&events).contains("Synthesis"));

    // 3 tool rounds + 1 synthesis round.
    let tool_uses = events.iter().filter(|e| matches!(e, TurnEvent::ToolUse { .. })).count();
    assert_eq!(tool_uses, 3);
}

/// Boundary: the soft turn timeout surfaces as a classified error and the
/// assistant turn is not persisted.
#[tokio::test]
async fn turn_timeout_classifies_and_discards() {
    let h = harness_with(
        |_req, _| Script::Stall,
        |config| config.limits.turn_timeout_s = 1,
    )
    .await;

    let events = h.run("c1", "faa-agent", "fp1", "q").await;

    match terminal_of(&events) {
        TurnEvent::Error { classification, .. } => assert_eq!(classification, "timeout"),
        other => panic!("expected timeout error, got {other:?}"),
    }

    let turns = h.state.turns.load_turns("c1").unwrap();
    assert_eq!(turns.len(), 1, "only the user turn persists");
}

/// A second message on a busy conversation queues with a warning and runs
/// after the first; sequences stay gap-free.
#[tokio::test]
async fn concurrent_turn_queues_with_warning() {
    let h = harness(|_req, call| match call {
        0 => Script::Delayed(
            Duration::from_millis(300),
            vec![StreamEvent::Token { text: "first".into() }, done()],
        ),
        _ => text_round("second"),
    })
    .await;

    let (_c1, rx1) = run_turn(h.state.clone(), h.input("c1", "faa-agent", "fp1", "one"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    let (_c2, rx2) = run_turn(h.state.clone(), h.input("c1", "faa-agent", "fp1", "two"));

    let (events1, events2) = tokio::join!(collect(rx1), collect(rx2));

    assert!(matches!(terminal_of(&events1), TurnEvent::Done { .. }));
    assert!(
        matches!(events2.first(), Some(TurnEvent::Warning { .. })),
        "queued turn announces itself"
    );
    assert!(matches!(terminal_of(&events2), TurnEvent::Done { .. }));

    let turns = h.state.turns.load_turns("c1").unwrap();
    assert_eq!(turns.len(), 4);
    for (i, turn) in turns.iter().enumerate() {
        assert_eq!(turn.sequence, i as u64);
    }
    assert_eq!(full_text(&events1), "first");
    assert_eq!(full_text(&events2), "second");
}

/// Reasoning deltas pass through as their own event type.
#[tokio::test]
async fn reasoning_stream_passes_through() {
    let h = harness(|_req, _| {
        Script::Events(vec![
            StreamEvent::Thinking { text: "weighing the sections".into() },
            StreamEvent::Token { text: "Answer.".into() },
            done(),
        ])
    })
    .await;

    let events = h.run("c1", "faa-agent", "fp1", "q").await;
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::Reasoning { text } if text.contains("weighing"))));
}

/// Every turn debits quota and reports the counter before `done`.
#[tokio::test]
async fn quota_update_precedes_done() {
    let h = harness(|_req, _| text_round("Answer.")).await;

    let events = h.run("c1", "faa-agent", "fp1", "q").await;

    let quota_pos = events
        .iter()
        .position(|e| matches!(e, TurnEvent::QuotaUpdate { used: 1, .. }))
        .expect("quota_update emitted");
    let done_pos = events
        .iter()
        .position(|e| matches!(e, TurnEvent::Done { .. }))
        .unwrap();
    assert!(quota_pos < done_pos);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Personal documents: upload API + round trip + dedup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn multipart_pdf(boundary: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"manual.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn post_upload(app: &axum::Router, bytes: &[u8]) -> (axum::http::StatusCode, Value) {
    use tower::ServiceExt;

    let boundary = "XuploadX";
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/v1/documents?agent=faa-agent")
        .header("Authorization", "Bearer fp1")
        .header("Content-Type", format!("multipart/form-data; boundary={boundary}"))
        .body(axum::body::Body::from(multipart_pdf(boundary, bytes)))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Upload indexes immediately; fetch reassembles the exact text; the same
/// bytes again are a 409 with no new chunks.
#[tokio::test]
async fn upload_round_trip_and_dedup() {
    let h = harness(|_req, _| text_round("unused")).await;
    let app = rg_gateway::api::router(h.state.clone());

    let (status, body) = post_upload(&app, b"%PDF-1.7 fake content").await;
    assert_eq!(status, axum::http::StatusCode::CREATED);
    let document_id = body["document_id"].as_str().unwrap().to_owned();
    assert_eq!(body["page_count"], 3);

    // Chunks are in the index immediately, owned by the uploader.
    let chunks = h.stub.chunks_in("faa-agent");
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.owner_fingerprint.as_deref() == Some("fp1")));

    // Round trip: fetch_personal_document reassembles the extracted text.
    let ctx = ToolContext {
        index_name: "faa-agent".into(),
        fingerprint: "fp1".into(),
        conversation_id: "c1".into(),
    };
    let (fetched, is_error) = h
        .state
        .catalog
        .dispatch(
            "fetch_personal_document",
            &json!({"document_id": document_id}),
            &ctx,
            &h.state.config.limits,
        )
        .await;
    assert!(!is_error);
    assert!(fetched.contains("torque the quantum flange to spec"));

    // Same bytes again: 409, chunk count unchanged.
    let before = h.stub.chunks_in("faa-agent").len();
    let (status, _) = post_upload(&app, b"%PDF-1.7 fake content").await;
    assert_eq!(status, axum::http::StatusCode::CONFLICT);
    assert_eq!(h.stub.chunks_in("faa-agent").len(), before);

    // Non-PDF bytes are rejected outright.
    let (status, _) = post_upload(&app, b"PK\x03\x04 zip archive").await;
    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

/// search_personal_document reads through the memo and returns the
/// matching passage.
#[tokio::test]
async fn search_within_personal_document() {
    let h = harness(|_req, _| text_round("unused")).await;
    let app = rg_gateway::api::router(h.state.clone());

    let (_, body) = post_upload(&app, b"%PDF-1.7 fake content").await;
    let document_id = body["document_id"].as_str().unwrap().to_owned();

    let ctx = ToolContext {
        index_name: "faa-agent".into(),
        fingerprint: "fp1".into(),
        conversation_id: "c1".into(),
    };
    let (result, is_error) = h
        .state
        .catalog
        .dispatch(
            "search_personal_document",
            &json!({"document_id": document_id, "query": "torque spec"}),
            &ctx,
            &h.state.config.limits,
        )
        .await;
    assert!(!is_error);
    assert!(result.contains("quantum flange"));

    // delete_my_document removes the chunks.
    let (deleted, is_error) = h
        .state
        .catalog
        .dispatch(
            "delete_my_document",
            &json!({"document_id": document_id}),
            &ctx,
            &h.state.config.limits,
        )
        .await;
    assert!(!is_error);
    assert!(deleted.contains("Deleted"));
    assert!(h.stub.chunks_in("faa-agent").is_empty());
}
