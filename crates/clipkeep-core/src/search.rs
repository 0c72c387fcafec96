//! Case-insensitive substring search over the history.
//!
//! The index owns no entries. It caches lowercased haystacks aligned with the
//! store's entry list; the store drops the cache on every mutation while it
//! holds the write lock, and the next query rebuilds it under the read lock.

use crate::entry::ClipboardEntry;
use std::sync::OnceLock;

struct Folded {
    content: Option<String>,
    preview: String,
}

impl Folded {
    fn of(entry: &ClipboardEntry) -> Self {
        Self {
            content: entry.content.searchable_text().map(|s| s.to_lowercase()),
            preview: entry.preview.to_lowercase(),
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.preview.contains(needle)
            || self
                .content
                .as_deref()
                .is_some_and(|c| c.contains(needle))
    }
}

#[derive(Default)]
pub struct SearchIndex {
    folded: OnceLock<Vec<Folded>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.folded = OnceLock::new();
    }

    pub fn is_built(&self) -> bool {
        self.folded.get().is_some()
    }

    /// Matches in the order of `entries` (most-recent-first). An empty query
    /// returns every entry.
    pub fn search<'a>(&self, entries: &'a [ClipboardEntry], query: &str) -> Vec<&'a ClipboardEntry> {
        if query.is_empty() {
            return entries.iter().collect();
        }
        let needle = query.to_lowercase();
        let folded = self
            .folded
            .get_or_init(|| entries.iter().map(Folded::of).collect());
        debug_assert_eq!(folded.len(), entries.len(), "search index out of sync");
        if folded.len() != entries.len() {
            return entries
                .iter()
                .filter(|e| Folded::of(e).matches(&needle))
                .collect();
        }
        entries
            .iter()
            .zip(folded)
            .filter(|(_, f)| f.matches(&needle))
            .map(|(e, _)| e)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Candidate, Content, EntryId, ImageRgba};

    fn entries() -> Vec<ClipboardEntry> {
        let mk = |id, c| ClipboardEntry::new(EntryId(id), Candidate::new(c), id as i64);
        vec![
            mk(3, Content::text("Hello World")),
            mk(
                2,
                Content::Image(ImageRgba {
                    width: 4,
                    height: 4,
                    bytes: vec![0; 64],
                }),
            ),
            mk(1, Content::FileList(vec!["/home/me/Report.pdf".into()])),
        ]
    }

    #[test]
    fn matches_case_insensitively_in_content_and_preview() {
        let idx = SearchIndex::new();
        let e = entries();
        let hits: Vec<_> = idx.search(&e, "WORLD").iter().map(|e| e.id).collect();
        assert_eq!(hits, vec![EntryId(3)]);
        // previews cover binary content
        let hits: Vec<_> = idx.search(&e, "image 4x4").iter().map(|e| e.id).collect();
        assert_eq!(hits, vec![EntryId(2)]);
        let hits: Vec<_> = idx.search(&e, "report").iter().map(|e| e.id).collect();
        assert_eq!(hits, vec![EntryId(1)]);
        assert!(idx.is_built());
    }

    #[test]
    fn empty_query_returns_everything_in_order() {
        let idx = SearchIndex::new();
        let e = entries();
        let all: Vec<_> = idx.search(&e, "").iter().map(|e| e.id).collect();
        assert_eq!(all, vec![EntryId(3), EntryId(2), EntryId(1)]);
        assert!(!idx.is_built());
    }

    #[test]
    fn invalidate_drops_the_cache() {
        let mut idx = SearchIndex::new();
        let mut e = entries();
        assert_eq!(idx.search(&e, "hello").len(), 1);
        e.remove(0);
        idx.invalidate();
        assert!(idx.search(&e, "hello").is_empty());
    }
}
