//! Two-stage retrieval pipeline.
//!
//! Composes the semantic index and the reranker into a bounded context
//! block: over-retrieve → rerank → per-result truncation → dedupe by
//! source → format. The output is what the agent sees as the observation
//! for its `search` tool.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::index;
use crate::rerank::{self, Reranker};
use crate::truncate::truncate_middle;

/// Sentinel returned when no candidate survives the pipeline.
///
/// Distinct from the empty string so callers can short-circuit without
/// spending a model call on an empty context.
pub const NO_RESULTS: &str = "No matching content found in the indexed repository.";

/// Run the full retrieval pipeline for `query` and format the result as
/// `[source]\ncontent` blocks joined by blank lines.
pub async fn build_context(
    pool: &SqlitePool,
    embedding: &EmbeddingConfig,
    retrieval: &RetrievalConfig,
    reranker: &dyn Reranker,
    query: &str,
) -> Result<String> {
    let candidates = index::query_over_retrieve(
        pool,
        embedding,
        query,
        retrieval.top_k,
        retrieval.over_retrieve_cap,
    )
    .await?;

    if candidates.is_empty() {
        return Ok(NO_RESULTS.to_string());
    }

    let ranked = rerank::rerank(reranker, query, candidates)?;

    // Keep the first (best-ranked) chunk per source file.
    let mut seen_sources = std::collections::HashSet::new();
    let mut blocks = Vec::new();

    for candidate in &ranked {
        if blocks.len() >= retrieval.top_k {
            break;
        }
        if !seen_sources.insert(candidate.chunk.metadata.source.clone()) {
            continue;
        }
        let content = truncate_middle(&candidate.chunk.content, retrieval.max_chunk_chars);
        blocks.push(format!("[{}]\n{}", candidate.chunk.metadata.source, content));
    }

    if blocks.is_empty() {
        return Ok(NO_RESULTS.to_string());
    }

    Ok(blocks.join("\n\n"))
}
