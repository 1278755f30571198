//! Head/tail truncation for tool observations and file contents.
//!
//! Long text is reduced to a head slice, an elision marker, and a tail
//! slice, so the model sees both how a file starts and how it ends.

/// Marker inserted between the retained head and tail. Kept short so the
/// 60/35 split plus the marker fits any budget of 100 chars or more.
pub const ELISION_MARKER: &str = "\n...\n";

/// Fraction of the budget spent on the head, in percent.
const HEAD_PCT: usize = 60;
/// Fraction of the budget spent on the tail, in percent.
const TAIL_PCT: usize = 35;

/// Truncate `text` to at most `max_chars` characters.
///
/// Text at or under the limit is returned unchanged. Otherwise the result
/// is `head + ELISION_MARKER + tail` where the head is ~60% and the tail
/// ~35% of the budget; the remainder absorbs the marker. Operates on
/// character counts, never splitting a multi-byte character.
pub fn truncate_middle(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let head_chars = max_chars * HEAD_PCT / 100;
    let tail_chars = max_chars * TAIL_PCT / 100;

    // Degenerate budgets smaller than the marker fall back to a plain cut.
    if head_chars + tail_chars + ELISION_MARKER.chars().count() > max_chars {
        return text.chars().take(max_chars).collect();
    }

    let head: String = text.chars().take(head_chars).collect();
    let tail: String = text
        .chars()
        .skip(total - tail_chars)
        .collect();

    format!("{}{}{}", head, ELISION_MARKER, tail)
}
