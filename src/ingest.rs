//! Repository ingestion pipeline.
//!
//! Walks a repository, chunks every recognized source file, embeds and
//! upserts the chunks, records each file in the path index, and rebuilds
//! the dependency graph. Re-running over an unchanged repository is cheap:
//! unchanged chunks keep their stored vectors.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sqlx::SqlitePool;
use std::path::Path;
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::graph::DependencyGraph;
use crate::index;

/// Directory names never descended into.
const EXCLUDED_DIRS: [&str; 12] = [
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "target",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

/// Files larger than this are skipped; generated bundles and data dumps
/// drown out real source in retrieval.
const MAX_FILE_BYTES: u64 = 1_048_576;

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub chunks_written: u64,
    pub chunks_skipped: u64,
    pub graph_nodes: usize,
    pub graph_edges: usize,
}

/// Ingest the repository at `repo_path` into the index and graph.
///
/// The rebuilt graph is saved to the configured path and also returned so
/// long-lived callers can swap it in without a reload.
pub async fn run_ingest(
    config: &Config,
    pool: &SqlitePool,
    repo_path: &Path,
) -> Result<(IngestReport, DependencyGraph)> {
    let repo_root = repo_path
        .canonicalize()
        .with_context(|| format!("Repository path not found: {}", repo_path.display()))?;

    let excludes = build_exclude_set(&config.ingest.exclude_globs)?;
    let mut report = IngestReport::default();
    let mut graph = DependencyGraph::new();
    let ingested_at = chrono::Utc::now().timestamp();

    let walker = WalkDir::new(&repo_root)
        .follow_links(config.ingest.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .is_some_and(|name| EXCLUDED_DIRS.contains(&name)))
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = entry
            .path()
            .strip_prefix(&repo_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if excludes.is_match(&rel_path) {
            report.files_skipped += 1;
            continue;
        }

        let Some(language) = language_for(entry.path()) else {
            report.files_skipped += 1;
            continue;
        };

        let too_large = entry
            .metadata()
            .map(|m| m.len() > MAX_FILE_BYTES)
            .unwrap_or(true);
        if too_large {
            report.files_skipped += 1;
            continue;
        }

        // Binary or otherwise unreadable files are skipped, not fatal.
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            report.files_skipped += 1;
            continue;
        };

        let chunks = chunk_text(
            &rel_path,
            language,
            &content,
            config.chunking.max_chars,
            config.chunking.overlap_chars,
        );
        let (written, skipped) = index::upsert_chunks(pool, &config.embedding, &chunks).await?;
        report.chunks_written += written;
        report.chunks_skipped += skipped;

        record_file(pool, &rel_path, entry.path(), ingested_at).await?;
        graph.parse_file(entry.path(), &repo_root);
        report.files_indexed += 1;
    }

    graph.save(&config.graph.path)?;
    report.graph_nodes = graph.node_count();
    report.graph_edges = graph.edge_count();

    println!("ingest {}", repo_root.display());
    println!("  files indexed: {}", report.files_indexed);
    println!("  files skipped: {}", report.files_skipped);
    println!("  chunks written: {}", report.chunks_written);
    println!("  chunks unchanged: {}", report.chunks_skipped);
    println!(
        "  graph: {} nodes, {} edges",
        report.graph_nodes, report.graph_edges
    );
    println!("ok");

    Ok((report, graph))
}

async fn record_file(
    pool: &SqlitePool,
    rel_path: &str,
    abs_path: &Path,
    ingested_at: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO files (rel_path, abs_path, ingested_at) VALUES (?, ?, ?)
        ON CONFLICT(rel_path) DO UPDATE SET
            abs_path = excluded.abs_path,
            ingested_at = excluded.ingested_at
        "#,
    )
    .bind(rel_path)
    .bind(abs_path.to_string_lossy().as_ref())
    .bind(ingested_at)
    .execute(pool)
    .await?;
    Ok(())
}

fn build_exclude_set(extra: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in extra {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid exclude glob: '{}'", pattern))?,
        );
    }
    Ok(builder.build()?)
}

/// Map a file extension to the language tag stored with its chunks.
/// Unlisted extensions are not ingested.
fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    match ext {
        "py" => Some("python"),
        "rs" => Some("rust"),
        "js" | "jsx" | "mjs" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "c" | "h" => Some("c"),
        "cpp" | "cc" | "hpp" => Some("cpp"),
        "rb" => Some("ruby"),
        "sh" => Some("shell"),
        "sql" => Some("sql"),
        "html" => Some("html"),
        "css" => Some("css"),
        "md" => Some("markdown"),
        "toml" | "yaml" | "yml" | "json" => Some("config"),
        "txt" => Some("text"),
        _ => None,
    }
}
