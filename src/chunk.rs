//! Sliding-window text chunker.
//!
//! Splits a source file's text into [`Chunk`]s of at most `max_chars`
//! characters with a fixed overlap between consecutive chunks, preferring
//! to break at line boundaries so chunks stay readable.
//!
//! Chunk ids are derived from the source path and ordinal, so re-chunking
//! the same file produces the same ids and upserts overwrite in place.

use crate::models::Chunk;

/// Split `text` into chunks for `source`, tagged with `language`.
/// Returns chunks with contiguous indices starting at 0; empty or
/// whitespace-only input produces no chunks.
pub fn chunk_text(source: &str, language: &str, text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.chars().count() <= max_chars {
        return vec![Chunk::new(source, 0, language, trimmed.to_string())];
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index: i64 = 0;

    while start < chars.len() {
        let hard_end = (start + max_chars).min(chars.len());

        // Prefer breaking at the last newline inside the window, as long as
        // doing so keeps the chunk from degenerating to a fragment.
        let end = if hard_end < chars.len() {
            match chars[start..hard_end].iter().rposition(|&c| c == '\n') {
                Some(pos) if pos > max_chars / 2 => start + pos + 1,
                _ => hard_end,
            }
        } else {
            hard_end
        };

        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            chunks.push(Chunk::new(source, index, language, piece.to_string()));
            index += 1;
        }

        if end >= chars.len() {
            break;
        }
        // Overlap is measured from the chosen break; always advance by at
        // least one character so the loop terminates.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    chunks
}
