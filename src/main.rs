//! # RepoQA CLI (`rqa`)
//!
//! The `rqa` binary is the primary interface for RepoQA. It provides
//! commands for database initialization, repository ingestion, retrieval,
//! agent-backed question answering, graph inspection, and starting the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! rqa --config ./config/rqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rqa init` | Create the SQLite database and run schema migrations |
//! | `rqa ingest <path>` | Index a repository: chunks, embeddings, graph |
//! | `rqa ask "<question>"` | Answer a question with the agent loop |
//! | `rqa search "<query>"` | Print the raw retrieval context for a query |
//! | `rqa graph` | Print the dependency graph as a Mermaid diagram |
//! | `rqa deps <path>` | List what a file imports (or `--reverse`) |
//! | `rqa serve` | Start the JSON HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use repoqa::agent::{self, AgentContext};
use repoqa::cache::AnswerCache;
use repoqa::config;
use repoqa::db;
use repoqa::graph::DependencyGraph;
use repoqa::ingest;
use repoqa::llm::ChatCompletionsClient;
use repoqa::migrate;
use repoqa::rerank::LexicalReranker;
use repoqa::retrieval;
use repoqa::server;

/// RepoQA CLI — ask questions about a code repository, answered from its
/// own source.
#[derive(Parser)]
#[command(
    name = "rqa",
    about = "RepoQA — local-first question answering over code repositories",
    version,
    long_about = "RepoQA ingests a repository into SQLite (chunked, embedded, and \
    dependency-graphed) and answers natural-language questions about it with a \
    tool-using agent loop grounded in the indexed source."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (chunks,
    /// chunk_vectors, files). Idempotent — running it again is safe.
    Init,

    /// Index a repository.
    ///
    /// Walks the repository, chunks every recognized source file, embeds
    /// and stores the chunks, and rebuilds the dependency graph.
    /// Re-running skips unchanged content.
    Ingest {
        /// Path to the repository root.
        path: PathBuf,
    },

    /// Answer a question with the agent loop.
    ///
    /// The model searches the index, reads files, and walks the import
    /// graph until it can ground an answer, then prints it.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Print the raw retrieval context for a query.
    ///
    /// Runs the retrieval pipeline (over-retrieve, rerank, truncate,
    /// dedupe) and prints the formatted context blocks the agent would see.
    Search {
        /// The search query string.
        query: String,
    },

    /// Print the dependency graph as a Mermaid diagram.
    Graph {
        /// Print node and edge counts instead of the diagram.
        #[arg(long)]
        stats: bool,
    },

    /// List a file's imports from the dependency graph.
    Deps {
        /// Repo-relative file path (or import target with --reverse).
        path: String,

        /// List dependents instead: what imports this target.
        #[arg(long)]
        reverse: bool,
    },

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// /query, /search, /ingest, /graph, and /health.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            ingest::run_ingest(&cfg, &pool, &path).await?;
        }
        Commands::Ask { question } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;

            let ctx = AgentContext {
                pool,
                graph: Arc::new(RwLock::new(DependencyGraph::load(&cfg.graph.path)?)),
                cache: Arc::new(AnswerCache::new(cfg.agent.cache_capacity)),
                llm: Arc::new(ChatCompletionsClient::new(&cfg.llm)?),
                reranker: Arc::new(LexicalReranker),
                config: cfg,
            };

            let answer = agent::answer_question(&ctx, &question).await?;
            println!("{}", answer);
        }
        Commands::Search { query } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;

            let context = retrieval::build_context(
                &pool,
                &cfg.embedding,
                &cfg.retrieval,
                &LexicalReranker,
                &query,
            )
            .await?;
            println!("{}", context);
        }
        Commands::Graph { stats } => {
            let graph = DependencyGraph::load(&cfg.graph.path)?;
            if stats {
                println!("nodes: {}", graph.node_count());
                println!("edges: {}", graph.edge_count());
            } else {
                println!("{}", graph.to_diagram());
            }
        }
        Commands::Deps { path, reverse } => {
            let graph = DependencyGraph::load(&cfg.graph.path)?;
            let targets = if reverse {
                graph.get_dependents(&path)
            } else {
                graph.get_dependencies(&path)
            };
            if targets.is_empty() {
                println!("(none)");
            } else {
                for target in targets {
                    println!("{}", target);
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
