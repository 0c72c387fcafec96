//! The bounded, ordered, deduplicated history.

use crate::entry::{now_unix, Candidate, ClipboardEntry, ContentHash, EntryId};
use crate::error::{Error, Result};
use crate::retention::RetentionPolicy;
use crate::search::SearchIndex;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Point-in-time copy of the store, as handed to persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Most-recent-first.
    pub entries: Vec<ClipboardEntry>,
    /// Next id to hand out. Persisted so ids are never reused across restarts.
    pub next_id: u64,
    pub generation: u64,
}

/// How `add` resolved a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddKind {
    Inserted,
    /// Matched the front entry; only its timestamp moved.
    Refreshed,
    /// Matched an older entry, which moved to the front keeping its id.
    MovedToFront,
}

struct Inner {
    entries: Vec<ClipboardEntry>,
    next_id: u64,
    generation: u64,
    policy: RetentionPolicy,
    index: SearchIndex,
}

impl Inner {
    fn touch(&mut self) {
        self.generation += 1;
        self.index.invalidate();
    }
}

/// Mutations take the write lock and are therefore serialized; reads share
/// the read lock and always observe a fully applied mutation.
pub struct HistoryStore {
    inner: RwLock<Inner>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl HistoryStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self::from_snapshot(Snapshot::default(), policy)
    }

    /// Rebuilds a store from persisted state. Ordering is re-established
    /// (newest first, ties keep their persisted order) and duplicate hashes
    /// collapse onto the most recent copy. No pruning happens here.
    pub fn from_snapshot(snapshot: Snapshot, policy: RetentionPolicy) -> Self {
        let mut entries = snapshot.entries;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let mut seen = std::collections::HashSet::new();
        let mut ids = std::collections::HashSet::new();
        entries.retain(|e| seen.insert(e.hash) && ids.insert(e.id));
        let floor = entries.iter().map(|e| e.id.0 + 1).max().unwrap_or(1);
        Self {
            inner: RwLock::new(Inner {
                entries,
                next_id: snapshot.next_id.max(floor),
                generation: snapshot.generation,
                policy,
                index: SearchIndex::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add(&self, candidate: Candidate) -> (ClipboardEntry, AddKind) {
        self.add_at(candidate, now_unix())
    }

    /// Inserts or refreshes `candidate` as of `now`, then prunes. Returns the
    /// resulting front entry.
    pub fn add_at(&self, candidate: Candidate, now: i64) -> (ClipboardEntry, AddKind) {
        let mut g = self.write();
        // Never stamp the front older than what is already there, so the list
        // stays sorted even if the wall clock steps backwards.
        let ts = g.entries.first().map_or(now, |e| e.timestamp.max(now));
        let kind = match g.entries.iter().position(|e| e.hash == candidate.hash) {
            Some(0) => {
                g.entries[0].timestamp = ts;
                AddKind::Refreshed
            }
            Some(i) => {
                let mut e = g.entries.remove(i);
                e.timestamp = ts;
                g.entries.insert(0, e);
                AddKind::MovedToFront
            }
            None => {
                let id = EntryId(g.next_id);
                g.next_id += 1;
                g.entries.insert(0, ClipboardEntry::new(id, candidate, ts));
                AddKind::Inserted
            }
        };
        let front = g.entries[0].clone();
        let policy = g.policy;
        let evicted = policy.apply(&mut g.entries, now);
        g.touch();
        tracing::debug!(id = %front.id, ?kind, evicted, "history add");
        (front, kind)
    }

    /// Most-recent-first copy of every entry.
    pub fn list(&self) -> Vec<ClipboardEntry> {
        self.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Result<ClipboardEntry> {
        self.read()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    pub fn front_hash(&self) -> Option<ContentHash> {
        self.read().entries.first().map(|e| e.hash)
    }

    pub fn remove(&self, id: EntryId) -> Result<ClipboardEntry> {
        let mut g = self.write();
        let pos = g
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(Error::NotFound(id))?;
        let removed = g.entries.remove(pos);
        g.touch();
        Ok(removed)
    }

    /// Empties the history. The id counter keeps counting.
    pub fn clear(&self) -> usize {
        let mut g = self.write();
        let n = g.entries.len();
        g.entries.clear();
        g.touch();
        n
    }

    pub fn prune(&self) -> usize {
        self.prune_at(now_unix())
    }

    /// Applies the current policy. A store that already complies is left
    /// untouched, generation included.
    pub fn prune_at(&self, now: i64) -> usize {
        let mut g = self.write();
        let policy = g.policy;
        let evicted = policy.apply(&mut g.entries, now);
        if evicted > 0 {
            g.touch();
        }
        evicted
    }

    pub fn search(&self, query: &str) -> Vec<ClipboardEntry> {
        let g = self.read();
        g.index
            .search(&g.entries, query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.read().policy
    }

    /// Takes effect on the next prune; nothing is evicted here.
    pub fn set_policy(&self, policy: RetentionPolicy) {
        self.write().policy = policy;
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn snapshot(&self) -> Snapshot {
        let g = self.read();
        Snapshot {
            entries: g.entries.clone(),
            next_id: g.next_id,
            generation: g.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Content;

    fn cand(s: &str) -> Candidate {
        Candidate::new(Content::text(s))
    }

    fn texts(store: &HistoryStore) -> Vec<String> {
        store.list().into_iter().map(|e| e.preview).collect()
    }

    #[test]
    fn count_eviction_drops_the_oldest() {
        let store = HistoryStore::new(RetentionPolicy::new(2, 30).unwrap());
        store.add_at(cand("A"), 100);
        assert_eq!(texts(&store), ["A"]);
        store.add_at(cand("B"), 101);
        assert_eq!(texts(&store), ["B", "A"]);
        store.add_at(cand("C"), 102);
        assert_eq!(texts(&store), ["C", "B"]);
    }

    #[test]
    fn recapture_of_front_refreshes_timestamp() {
        let store = HistoryStore::default();
        let (first, kind) = store.add_at(cand("A"), 100);
        assert_eq!(kind, AddKind::Inserted);
        let (again, kind) = store.add_at(cand("A"), 250);
        assert_eq!(kind, AddKind::Refreshed);
        assert_eq!(again.id, first.id);
        assert_eq!(again.timestamp, 250);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn recapture_of_older_entry_moves_it_to_front() {
        let store = HistoryStore::default();
        let (a, _) = store.add_at(cand("A"), 100);
        store.add_at(cand("B"), 101);
        let (moved, kind) = store.add_at(cand("A"), 102);
        assert_eq!(kind, AddKind::MovedToFront);
        assert_eq!(moved.id, a.id);
        assert_eq!(texts(&store), ["A", "B"]);
        assert_eq!(store.get(a.id).unwrap().timestamp, 102);
    }

    #[test]
    fn ids_are_not_reused_after_clear() {
        let store = HistoryStore::default();
        let (a, _) = store.add_at(cand("A"), 1);
        assert_eq!(store.clear(), 1);
        let (b, _) = store.add_at(cand("A"), 2);
        assert!(b.id > a.id);
        assert!(matches!(store.get(a.id), Err(Error::NotFound(_))));
    }

    #[test]
    fn backwards_clock_keeps_order() {
        let store = HistoryStore::default();
        store.add_at(cand("A"), 1_000);
        let (b, _) = store.add_at(cand("B"), 900);
        assert_eq!(b.timestamp, 1_000);
        let list = store.list();
        assert!(list.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn policy_change_is_lazy() {
        let store = HistoryStore::default();
        for (i, s) in ["a", "b", "c"].iter().enumerate() {
            store.add_at(cand(s), i as i64);
        }
        let gen = store.generation();
        store.set_policy(RetentionPolicy::new(1, 30).unwrap());
        assert_eq!(store.len(), 3);
        assert_eq!(store.generation(), gen);
        assert_eq!(store.prune_at(3), 2);
        assert_eq!(texts(&store), ["c"]);
    }

    #[test]
    fn prune_without_evictions_keeps_generation() {
        let store = HistoryStore::default();
        store.add_at(cand("a"), 10);
        let gen = store.generation();
        assert_eq!(store.prune_at(11), 0);
        assert_eq!(store.generation(), gen);
    }

    #[test]
    fn snapshot_restore_orders_and_dedups() {
        let mk = |id, s: &str, ts| ClipboardEntry::new(EntryId(id), cand(s), ts);
        let snap = Snapshot {
            entries: vec![mk(1, "old", 10), mk(5, "new", 50), mk(3, "new", 30)],
            next_id: 2,
            generation: 7,
        };
        let store = HistoryStore::from_snapshot(snap, RetentionPolicy::default());
        let ids: Vec<_> = store.list().iter().map(|e| e.id.0).collect();
        assert_eq!(ids, vec![5, 1]);
        let (fresh, _) = store.add_at(cand("fresh"), 60);
        assert_eq!(fresh.id, EntryId(6));
    }

    #[test]
    fn remove_missing_is_not_found() {
        let store = HistoryStore::default();
        assert!(matches!(
            store.remove(EntryId(42)),
            Err(Error::NotFound(EntryId(42)))
        ));
    }
}
