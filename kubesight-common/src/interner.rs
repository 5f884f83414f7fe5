//! String interning for label names and values.
//!
//! A scrape of a busy target repeats the same handful of label keys and
//! values across thousands of samples. Interning them lets every point share
//! one allocation per distinct string instead of duplicating it.

use std::collections::HashSet;
use std::sync::Arc;

/// Maps equal strings to one shared `Arc<str>`.
///
/// Entries are never evicted: an interner is meant to live for exactly one
/// translation pass and be dropped afterwards, which bounds its memory by the
/// cardinality of that single scrape.
#[derive(Debug, Default)]
pub struct StringInterner {
    pool: HashSet<Arc<str>>,
}

impl StringInterner {
    /// Create an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared storage for `s`, allocating it on first sight.
    ///
    /// Two calls with equal content return pointer-identical `Arc`s.
    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some(existing) = self.pool.get(s) {
            return Arc::clone(existing);
        }

        let interned: Arc<str> = Arc::from(s);
        self.pool.insert(Arc::clone(&interned));
        interned
    }

    /// Number of distinct strings held.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}
