//! Bounded answer cache with least-recently-used eviction.
//!
//! Questions are normalized (trimmed, case-folded) before use as keys, so
//! whitespace and case variants of the same question share an entry. The
//! cache is safe for concurrent use; both operations take an internal
//! lock around a short critical section.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Normalize a question into its cache key.
pub fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

/// LRU map from normalized question to answer text.
pub struct AnswerCache {
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    capacity: usize,
    entries: HashMap<String, String>,
    // Front = least recently used, back = most recently used.
    order: VecDeque<String>,
}

impl AnswerCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                capacity: capacity.max(1),
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Look up an answer; a hit refreshes the entry's recency.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().ok()?;
        let answer = inner.entries.get(key).cloned()?;
        inner.touch(key);
        Some(answer)
    }

    /// Insert or update an answer, evicting the least recently used entry
    /// when at capacity. Never fails; a poisoned lock is ignored so a
    /// cache write can never fail the request that produced the answer.
    pub fn put(&self, key: &str, answer: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.entries.contains_key(key) {
            inner.entries.insert(key.to_string(), answer.to_string());
            inner.touch(key);
            return;
        }

        if inner.entries.len() >= inner.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }

        inner.entries.insert(key.to_string(), answer.to_string());
        inner.order.push_back(key.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
            self.order.push_back(key.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_case_and_whitespace() {
        assert_eq!(normalize_question("  What Does Main Do?  "), "what does main do?");
        assert_eq!(
            normalize_question("what does main do?"),
            normalize_question("WHAT DOES MAIN DO?\n")
        );
    }

    #[test]
    fn test_put_then_get() {
        let cache = AnswerCache::new(4);
        cache.put("q1", "a1");
        assert_eq!(cache.get("q1").as_deref(), Some("a1"));
        assert_eq!(cache.get("q2"), None);
    }

    #[test]
    fn test_update_existing_key_keeps_single_entry() {
        let cache = AnswerCache::new(4);
        cache.put("q", "first");
        cache.put("q", "second");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("q").as_deref(), Some("second"));
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = AnswerCache::new(2);
        cache.put("a", "1");
        cache.put("b", "2");

        // Touch "a" so "b" becomes the eviction victim.
        cache.get("a");
        cache.put("c", "3");

        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let cache = AnswerCache::new(3);
        for i in 0..10 {
            cache.put(&format!("q{}", i), "a");
        }
        assert_eq!(cache.len(), 3);
    }
}
