//! Precision rerank stage for over-retrieved candidates.
//!
//! The initial index query is approximate; the reranker rescores each
//! (query, content) pair with a finer-grained relevance measure and
//! reorders candidates by that score. Sorting is stable, so candidates
//! with equal scores keep their original retrieval order.

use anyhow::Result;

use crate::models::RetrievalCandidate;

/// Scores query-document pairs. Implementations must be deterministic:
/// identical inputs produce identical scores.
pub trait Reranker: Send + Sync {
    /// Score each document against the query; one score per document,
    /// higher means more relevant.
    fn score_batch(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Lexical precision scorer.
///
/// Scores a document by weighted token overlap with the query: each query
/// token found in the document contributes inversely to its own length
/// rank (rarer, longer tokens count more), with a bonus when the document
/// contains the query tokens in order as a phrase.
pub struct LexicalReranker;

impl Reranker for LexicalReranker {
    fn score_batch(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        let query_lower = query.to_lowercase();
        let query_tokens: Vec<&str> = tokenize(&query_lower);
        if query_tokens.is_empty() {
            return Ok(vec![0.0; documents.len()]);
        }

        let scores = documents
            .iter()
            .map(|doc| {
                let doc_lower = doc.to_lowercase();
                let doc_tokens: std::collections::HashSet<&str> =
                    tokenize(&doc_lower).into_iter().collect();

                let mut score = 0.0f32;
                let mut weight_total = 0.0f32;
                for token in &query_tokens {
                    // Longer tokens are more discriminative.
                    let weight = token.len() as f32;
                    weight_total += weight;
                    if doc_tokens.contains(token) {
                        score += weight;
                    }
                }

                let mut score = score / weight_total;
                if query_tokens.len() > 1 && doc_lower.contains(query_lower.trim()) {
                    score += 0.5;
                }
                score
            })
            .collect();

        Ok(scores)
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .collect()
}

/// Rescore candidates and sort them descending by rerank score.
///
/// The sort is stable: ties keep the initial retrieval order.
pub fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    mut candidates: Vec<RetrievalCandidate>,
) -> Result<Vec<RetrievalCandidate>> {
    let documents: Vec<String> = candidates.iter().map(|c| c.chunk.content.clone()).collect();
    let scores = reranker.score_batch(query, &documents)?;

    for (candidate, score) in candidates.iter_mut().zip(scores.iter()) {
        candidate.rerank_score = *score;
    }

    // sort_by is stable; equal scores preserve retrieval order.
    candidates.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn candidate(source: &str, index: i64, content: &str, initial: f32) -> RetrievalCandidate {
        RetrievalCandidate {
            chunk: Chunk::new(source, index, "text", content.to_string()),
            initial_score: initial,
            rerank_score: 0.0,
        }
    }

    #[test]
    fn test_rerank_prefers_overlapping_content() {
        let candidates = vec![
            candidate("ui.js", 0, "sidebar navigation render loop", 0.9),
            candidate("db.py", 0, "database connection pool lifecycle", 0.8),
        ];

        let out = rerank(&LexicalReranker, "database connection pool", candidates).unwrap();
        assert_eq!(out[0].chunk.metadata.source, "db.py");
        assert!(out[0].rerank_score > out[1].rerank_score);
    }

    #[test]
    fn test_rerank_deterministic() {
        let make = || {
            vec![
                candidate("a", 0, "alpha beta gamma", 0.5),
                candidate("b", 0, "beta gamma delta", 0.4),
                candidate("c", 0, "unrelated words entirely", 0.3),
            ]
        };

        let first = rerank(&LexicalReranker, "beta gamma", make()).unwrap();
        let second = rerank(&LexicalReranker, "beta gamma", make()).unwrap();

        let ids: Vec<_> = first.iter().map(|c| c.chunk.id.clone()).collect();
        let ids2: Vec<_> = second.iter().map(|c| c.chunk.id.clone()).collect();
        assert_eq!(ids, ids2);
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let candidates = vec![
            candidate("first", 0, "nothing relevant here", 0.9),
            candidate("second", 0, "equally irrelevant text", 0.8),
            candidate("third", 0, "also not a match at all", 0.7),
        ];

        let out = rerank(&LexicalReranker, "zzz qqq", candidates).unwrap();
        let sources: Vec<_> = out.iter().map(|c| c.chunk.metadata.source.as_str()).collect();
        assert_eq!(sources, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        let scores = LexicalReranker
            .score_batch("", &["some document".to_string()])
            .unwrap();
        assert_eq!(scores, vec![0.0]);
    }
}
