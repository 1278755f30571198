use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use repoqa::agent::{self, AgentContext};
use repoqa::cache::AnswerCache;
use repoqa::config::load_config;
use repoqa::graph::DependencyGraph;
use repoqa::ingest;
use repoqa::llm::LlmClient;
use repoqa::migrate;
use repoqa::models::ChatMessage;
use repoqa::rerank::LexicalReranker;
use repoqa::retrieval;

fn rqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rqa");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    // A small fake repository to ingest.
    let repo = root.join("repo");
    fs::create_dir_all(repo.join("backend")).unwrap();
    fs::create_dir_all(repo.join(".git")).unwrap();
    fs::write(
        repo.join("backend/main.py"),
        "import os\nfrom backend import db\n\ndef run():\n    pool = db.connect()\n    return pool\n",
    )
    .unwrap();
    fs::write(
        repo.join("backend/db.py"),
        "def connect():\n    \"\"\"Open the database connection pool.\"\"\"\n    return 'pool'\n",
    )
    .unwrap();
    fs::write(repo.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/rqa.sqlite"

[graph]
path = "{root}/data/graph.json"

[embedding]
provider = "hash"
dims = 128

[server]
bind = "127.0.0.1:7433"
"#,
        root = root.display()
    );

    let config_path = root.join("config/rqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rqa(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rqa_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn repo_path(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("repo")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_rqa(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_rqa(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rqa(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_reports_counts() {
    let (_tmp, config_path) = setup_test_env();
    let repo = repo_path(&config_path);

    run_rqa(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_rqa(&config_path, &["ingest", repo.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files indexed: 2"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reingest_reports_unchanged() {
    let (_tmp, config_path) = setup_test_env();
    let repo = repo_path(&config_path);

    run_rqa(&config_path, &["init"]);
    run_rqa(&config_path, &["ingest", repo.to_str().unwrap()]);
    let (stdout, _, success) = run_rqa(&config_path, &["ingest", repo.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("chunks written: 0"));
}

#[test]
fn test_search_returns_context_blocks() {
    let (_tmp, config_path) = setup_test_env();
    let repo = repo_path(&config_path);

    run_rqa(&config_path, &["init"]);
    run_rqa(&config_path, &["ingest", repo.to_str().unwrap()]);

    let (stdout, stderr, success) =
        run_rqa(&config_path, &["search", "database connection pool"]);
    assert!(success, "search failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("[backend/db.py]"));
    assert!(stdout.contains("connection pool"));
}

#[test]
fn test_graph_and_deps_commands() {
    let (_tmp, config_path) = setup_test_env();
    let repo = repo_path(&config_path);

    run_rqa(&config_path, &["init"]);
    run_rqa(&config_path, &["ingest", repo.to_str().unwrap()]);

    let (stdout, _, success) = run_rqa(&config_path, &["graph"]);
    assert!(success);
    assert!(stdout.starts_with("graph TD"));
    assert!(stdout.contains("backend/main.py"));

    let (stdout, _, success) = run_rqa(&config_path, &["deps", "backend/main.py"]);
    assert!(success);
    assert!(stdout.contains("os"));
    assert!(stdout.contains("backend"));

    let (stdout, _, success) = run_rqa(&config_path, &["deps", "os", "--reverse"]);
    assert!(success);
    assert!(stdout.contains("backend/main.py"));
}

// ---- agent flow against the library API ----

/// Scripted stand-in for the chat-completions API.
struct ScriptedClient {
    turns: Vec<String>,
    calls: std::sync::atomic::AtomicUsize,
}

impl ScriptedClient {
    fn new(turns: Vec<&str>) -> Self {
        Self {
            turns: turns.into_iter().map(String::from).collect(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let turn = self.turns.get(n).or_else(|| self.turns.last()).unwrap();
        Ok(turn.clone())
    }
}

async fn agent_context(config_path: &Path, llm: Arc<dyn LlmClient>) -> AgentContext {
    let config = load_config(config_path).unwrap();
    let pool = repoqa::db::connect(&config.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let graph = DependencyGraph::load(&config.graph.path).unwrap();
    AgentContext {
        cache: Arc::new(AnswerCache::new(config.agent.cache_capacity)),
        graph: Arc::new(RwLock::new(graph)),
        reranker: Arc::new(LexicalReranker),
        config,
        pool,
        llm,
    }
}

#[tokio::test]
async fn test_agent_answers_from_ingested_repo() {
    let (_tmp, config_path) = setup_test_env();
    let repo = repo_path(&config_path);

    let llm = Arc::new(ScriptedClient::new(vec![
        "search: database connection pool",
        "Final Answer: the pool is opened by `connect()` in backend/db.py.",
    ]));
    let ctx = agent_context(&config_path, llm.clone()).await;

    let (_, graph) = ingest::run_ingest(&ctx.config, &ctx.pool, &repo).await.unwrap();
    *ctx.graph.write().unwrap() = graph;

    let answer = agent::answer_question(&ctx, "Where is the connection pool opened?")
        .await
        .unwrap();
    assert!(answer.contains("backend/db.py"));
    assert_eq!(llm.call_count(), 2);

    // The same question again is served from the cache.
    let again = agent::answer_question(&ctx, "where is the connection pool opened?")
        .await
        .unwrap();
    assert_eq!(again, answer);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_agent_walks_dependency_graph() {
    let (_tmp, config_path) = setup_test_env();
    let repo = repo_path(&config_path);

    let llm = Arc::new(ScriptedClient::new(vec![
        "get_dependencies: backend/main.py",
        "Final Answer: backend/main.py imports os and backend.",
    ]));
    let ctx = agent_context(&config_path, llm.clone()).await;

    let (_, graph) = ingest::run_ingest(&ctx.config, &ctx.pool, &repo).await.unwrap();
    *ctx.graph.write().unwrap() = graph;

    let answer = agent::answer_question(&ctx, "What does main.py import?")
        .await
        .unwrap();
    assert!(answer.contains("os"));
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_retrieval_empty_index_sentinel() {
    let (_tmp, config_path) = setup_test_env();
    let config = load_config(&config_path).unwrap();
    let pool = repoqa::db::connect(&config.db.path).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let context = retrieval::build_context(
        &pool,
        &config.embedding,
        &config.retrieval,
        &LexicalReranker,
        "anything at all",
    )
    .await
    .unwrap();
    assert_eq!(context, retrieval::NO_RESULTS);
}
