//! Core data models used throughout repoqa.
//!
//! These types represent the chunks, retrieval candidates, and agent
//! transcript turns that flow through the retrieval and reasoning pipeline.

use serde::{Deserialize, Serialize};

/// Metadata carried by every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Repo-relative path of the file the chunk came from.
    pub source: String,
    /// Ordinal of the chunk within its source file, starting at 0.
    pub chunk_index: i64,
    /// Language tag derived from the file extension (e.g. `"python"`, `"rust"`, `"text"`).
    pub language: String,
}

/// A bounded slice of source text; the unit of semantic indexing.
///
/// Chunk ids are `"{source}:{chunk_index}"` and therefore unique per
/// (source, ordinal). Re-upserting an id overwrites content and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn new(source: &str, chunk_index: i64, language: &str, content: String) -> Self {
        Self {
            id: format!("{}:{}", source, chunk_index),
            content,
            metadata: ChunkMetadata {
                source: source.to_string(),
                chunk_index,
                language: language.to_string(),
            },
        }
    }
}

/// A chunk returned by initial similarity search, scored and ephemeral.
///
/// `initial_score` is the cosine similarity from the index query;
/// `rerank_score` is filled in by the precision rerank stage.
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub initial_score: f32,
    pub rerank_score: f32,
}

/// Role of a transcript turn sent to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged turn in an agent transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_from_source_and_ordinal() {
        let chunk = Chunk::new("backend/main.py", 3, "python", "def main(): ...".to_string());
        assert_eq!(chunk.id, "backend/main.py:3");
        assert_eq!(chunk.metadata.chunk_index, 3);
        assert_eq!(chunk.metadata.language, "python");
    }
}
