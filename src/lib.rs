//! # RepoQA
//!
//! A local-first question-answering engine for code repositories.
//!
//! RepoQA ingests a repository into SQLite (chunked, embedded, and
//! dependency-graphed), then answers natural-language questions about it
//! with a tool-using agent loop: the model searches the semantic index,
//! reads files, and walks the import graph until it can ground an answer
//! in actual source.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Repository  │──▶│   Pipeline    │──▶│  SQLite    │
//! │  walk files  │   │ Chunk+Embed  │   │ + graph.json│
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌──────────┐
//!                 │  Agent    │◀────────│ Retrieval │
//!                 │  loop     │  tools  │ + rerank  │
//!                 └────┬─────┘          └──────────┘
//!                      ▼
//!              CLI (rqa) / HTTP
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rqa init                          # create database
//! rqa ingest /path/to/repo          # index a repository
//! rqa ask "where is auth handled?"  # agent-backed answer
//! rqa search "connection pool"      # raw retrieval context
//! rqa serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Sliding-window text chunking |
//! | [`embedding`] | Embedding providers (hash, OpenAI) |
//! | [`index`] | Semantic index over chunk vectors |
//! | [`rerank`] | Lexical reranking stage |
//! | [`retrieval`] | Two-stage retrieval pipeline |
//! | [`graph`] | File-level dependency graph |
//! | [`ingest`] | Repository ingestion |
//! | [`llm`] | Chat-completions client |
//! | [`agent`] | Think-act-observe agent loop |
//! | [`cache`] | Bounded answer cache |
//! | [`truncate`] | Head/tail text truncation |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod graph;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod rerank;
pub mod retrieval;
pub mod server;
pub mod truncate;
