use anyhow::Result;
use sqlx::SqlitePool;

/// Create the repoqa schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Indexed chunks. The id encodes (source, chunk_index); the hash lets
    // ingestion skip re-embedding unchanged content.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            language TEXT NOT NULL DEFAULT 'text',
            content TEXT NOT NULL,
            hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One embedding vector per chunk, little-endian f32 BLOB.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Path index for the agent's `read` tool: relative path -> absolute path,
    // rebuilt on each ingestion so lookups avoid a directory walk per call.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            rel_path TEXT PRIMARY KEY,
            abs_path TEXT NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source)")
        .execute(pool)
        .await?;

    Ok(())
}
