//! JSON HTTP API.
//!
//! Exposes the question-answering flow to browser frontends and scripts.
//!
//! # Endpoints
//!
//! | Method | Path      | Description |
//! |--------|-----------|-------------|
//! | `POST` | `/query`  | Answer a question about the ingested repository |
//! | `POST` | `/search` | Raw retrieval: the context block for a query |
//! | `POST` | `/ingest` | (Re)ingest a repository path |
//! | `GET`  | `/graph`  | Dependency graph as a Mermaid diagram |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends
//! can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tower_http::cors::{Any, CorsLayer};

use crate::agent::{self, AgentContext};
use crate::cache::AnswerCache;
use crate::config::Config;
use crate::db;
use crate::graph::DependencyGraph;
use crate::ingest;
use crate::llm::ChatCompletionsClient;
use crate::migrate;
use crate::rerank::LexicalReranker;
use crate::retrieval;

#[derive(Clone)]
struct AppState {
    ctx: Arc<AgentContext>,
}

/// Start the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let graph = DependencyGraph::load(&config.graph.path)?;
    let llm = ChatCompletionsClient::new(&config.llm)?;

    let ctx = Arc::new(AgentContext {
        config: config.clone(),
        pool,
        graph: Arc::new(RwLock::new(graph)),
        cache: Arc::new(AnswerCache::new(config.agent.cache_capacity)),
        llm: Arc::new(llm),
        reranker: Arc::new(LexicalReranker),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(AppState { ctx }).layer(cors);

    let bind_addr = config.server.bind.clone();
    println!("server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/search", post(handle_search))
        .route("/ingest", post(handle_ingest))
        .route("/graph", get(handle_graph))
        .route("/health", get(handle_health))
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let answer = agent::answer_question(&state.ctx, &req.question)
        .await
        .map_err(internal)?;

    Ok(Json(QueryResponse { answer }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    context: String,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let ctx = &state.ctx;
    let context = retrieval::build_context(
        &ctx.pool,
        &ctx.config.embedding,
        &ctx.config.retrieval,
        ctx.reranker.as_ref(),
        &req.query,
    )
    .await
    .map_err(internal)?;

    Ok(Json(SearchResponse { context }))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    path: PathBuf,
}

#[derive(Serialize)]
struct IngestResponse {
    files_indexed: u64,
    chunks_written: u64,
    chunks_unchanged: u64,
    graph_nodes: usize,
    graph_edges: usize,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let ctx = &state.ctx;
    let (report, graph) = ingest::run_ingest(&ctx.config, &ctx.pool, &req.path)
        .await
        .map_err(internal)?;

    // Swap the freshly built graph into the running agent.
    if let Ok(mut shared) = ctx.graph.write() {
        *shared = graph;
    }

    Ok(Json(IngestResponse {
        files_indexed: report.files_indexed,
        chunks_written: report.chunks_written,
        chunks_unchanged: report.chunks_skipped,
        graph_nodes: report.graph_nodes,
        graph_edges: report.graph_edges,
    }))
}

// ============ GET /graph ============

#[derive(Serialize)]
struct GraphResponse {
    nodes: usize,
    edges: usize,
    diagram: String,
}

async fn handle_graph(State(state): State<AppState>) -> Result<Json<GraphResponse>, AppError> {
    let graph = state
        .ctx
        .graph
        .read()
        .map_err(|_| internal(anyhow::anyhow!("graph lock poisoned")))?;

    Ok(Json(GraphResponse {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        diagram: graph.to_diagram(),
    }))
}
