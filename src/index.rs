//! Semantic index over chunk embeddings.
//!
//! Chunks live in the `chunks` table and their embeddings in
//! `chunk_vectors`, keyed by chunk id. Upserts are batched and idempotent;
//! re-upserting an id overwrites its content, metadata, and vector.
//! Queries embed the query text and rank stored chunks by cosine
//! similarity in process.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::config::EmbeddingConfig;
use crate::embedding;
use crate::models::{Chunk, ChunkMetadata, RetrievalCandidate};

/// Upsert chunks in batches, embedding each batch in one provider call.
///
/// Chunks whose stored content hash is unchanged keep their existing
/// vector and are skipped. Returns (written, skipped) counts.
pub async fn upsert_chunks(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    chunks: &[Chunk],
) -> Result<(u64, u64)> {
    let mut written = 0u64;
    let mut skipped = 0u64;

    for batch in chunks.chunks(config.batch_size.max(1)) {
        // Partition the batch into fresh and unchanged chunks.
        let mut fresh = Vec::new();
        for chunk in batch {
            let hash = content_hash(&chunk.content);
            let existing: Option<String> =
                sqlx::query_scalar("SELECT hash FROM chunks WHERE id = ?")
                    .bind(&chunk.id)
                    .fetch_optional(pool)
                    .await?;
            if existing.as_deref() == Some(hash.as_str()) {
                skipped += 1;
            } else {
                fresh.push((chunk, hash));
            }
        }

        if fresh.is_empty() {
            continue;
        }

        let texts: Vec<String> = fresh.iter().map(|(c, _)| c.content.clone()).collect();
        let vectors = embedding::embed_texts(config, &texts).await?;

        let mut tx = pool.begin().await?;
        for ((chunk, hash), vector) in fresh.iter().zip(vectors.iter()) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, chunk_index, language, content, hash)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    source = excluded.source,
                    chunk_index = excluded.chunk_index,
                    language = excluded.language,
                    content = excluded.content,
                    hash = excluded.hash
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.metadata.source)
            .bind(chunk.metadata.chunk_index)
            .bind(&chunk.metadata.language)
            .bind(&chunk.content)
            .bind(hash)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;

            written += 1;
        }
        tx.commit().await?;
    }

    Ok((written, skipped))
}

/// Return the `k` nearest chunks to `query` by embedding similarity.
///
/// Candidates come back sorted by descending similarity, ties broken by
/// chunk id so ordering is deterministic.
pub async fn query(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    query: &str,
    k: usize,
) -> Result<Vec<RetrievalCandidate>> {
    let query_vec = embedding::embed_query(config, query).await?;

    let rows = sqlx::query(
        r#"
        SELECT c.id, c.source, c.chunk_index, c.language, c.content, cv.embedding
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut candidates: Vec<RetrievalCandidate> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let stored = embedding::blob_to_vec(&blob);
            let score = embedding::cosine_similarity(&query_vec, &stored);
            RetrievalCandidate {
                chunk: Chunk {
                    id: row.get("id"),
                    content: row.get("content"),
                    metadata: ChunkMetadata {
                        source: row.get("source"),
                        chunk_index: row.get("chunk_index"),
                        language: row.get("language"),
                    },
                },
                initial_score: score,
                rerank_score: 0.0,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.initial_score
            .partial_cmp(&a.initial_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    candidates.truncate(k);

    Ok(candidates)
}

/// Over-retrieve for the rerank stage: up to `min(3k, cap)` candidates.
pub async fn query_over_retrieve(
    pool: &SqlitePool,
    config: &EmbeddingConfig,
    text: &str,
    k: usize,
    cap: usize,
) -> Result<Vec<RetrievalCandidate>> {
    query(pool, config, text, (3 * k).min(cap)).await
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::migrate;

    async fn test_pool() -> SqlitePool {
        // A single connection so the in-memory database is shared.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        pool
    }

    fn hash_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "hash".to_string(),
            dims: 128,
            ..EmbeddingConfig::default()
        }
    }

    fn make_chunk(source: &str, index: i64, content: &str) -> Chunk {
        Chunk::new(source, index, "text", content.to_string())
    }

    #[tokio::test]
    async fn test_upsert_same_id_overwrites() {
        let pool = test_pool().await;
        let cfg = hash_config();

        let first = vec![make_chunk("a.py", 0, "original content")];
        upsert_chunks(&pool, &cfg, &first).await.unwrap();

        let second = vec![make_chunk("a.py", 0, "replacement content")];
        upsert_chunks(&pool, &cfg, &second).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let content: String = sqlx::query_scalar("SELECT content FROM chunks WHERE id = 'a.py:0'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(content, "replacement content");
    }

    #[tokio::test]
    async fn test_upsert_unchanged_content_skipped() {
        let pool = test_pool().await;
        let cfg = hash_config();
        let chunks = vec![make_chunk("a.py", 0, "stable content")];

        let (written, skipped) = upsert_chunks(&pool, &cfg, &chunks).await.unwrap();
        assert_eq!((written, skipped), (1, 0));

        let (written, skipped) = upsert_chunks(&pool, &cfg, &chunks).await.unwrap();
        assert_eq!((written, skipped), (0, 1));
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let pool = test_pool().await;
        let cfg = hash_config();
        let chunks = vec![
            make_chunk("db.py", 0, "database connection pool setup and teardown"),
            make_chunk("ui.js", 0, "render the sidebar navigation component"),
            make_chunk("db.py", 1, "database pool sizing configuration"),
        ];
        upsert_chunks(&pool, &cfg, &chunks).await.unwrap();

        let results = query(&pool, &cfg, "database connection pool", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].chunk.metadata.source.starts_with("db"));
        assert!(results[0].initial_score >= results[1].initial_score);
    }

    #[tokio::test]
    async fn test_over_retrieve_caps_candidates() {
        let pool = test_pool().await;
        let cfg = hash_config();
        let chunks: Vec<Chunk> = (0..30)
            .map(|i| make_chunk("big.txt", i, &format!("paragraph about topic {}", i)))
            .collect();
        upsert_chunks(&pool, &cfg, &chunks).await.unwrap();

        let results = query_over_retrieve(&pool, &cfg, "topic", 5, 20).await.unwrap();
        assert_eq!(results.len(), 15); // min(3 * 5, 20)

        let results = query_over_retrieve(&pool, &cfg, "topic", 10, 20).await.unwrap();
        assert_eq!(results.len(), 20); // min(30, 20)
    }
}
