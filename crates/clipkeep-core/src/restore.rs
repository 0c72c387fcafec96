use crate::entry::{join_paths, ClipboardEntry, Content, ContentHash, EntryId};
use crate::error::Result;
use crate::store::HistoryStore;
use crate::watcher::ClipboardWatcher;
use std::sync::Arc;

/// Writes stored entries back to the OS clipboard.
pub struct RestoreService {
    store: Arc<HistoryStore>,
    watcher: Arc<ClipboardWatcher>,
}

impl RestoreService {
    pub fn new(store: Arc<HistoryStore>, watcher: Arc<ClipboardWatcher>) -> Self {
        Self { store, watcher }
    }

    /// Puts entry `id` on the clipboard and records it as seen, so the next
    /// poll does not capture it again. The history itself is not modified.
    pub fn copy(&self, id: EntryId) -> Result<ClipboardEntry> {
        let entry = self.store.get(id)?;
        let mut guard = self.watcher.lock();
        if let Err(e) = guard.clipboard().write(&entry.content) {
            if guard.call_pending() {
                // The write may still land after the deadline.
                guard.mark_seen(expected_readback(&entry));
                tracing::warn!(id = %entry.id, error = %e, "restore write still pending");
            }
            return Err(e);
        }
        // Some representations come back changed (file lists read back as
        // text), so fingerprint what the next poll is going to see.
        let seen = match guard.clipboard().read() {
            Ok(Some(content)) => content.hash(),
            _ => expected_readback(&entry),
        };
        guard.mark_seen(seen);
        tracing::info!(id = %entry.id, content_type = %entry.content_type, "restored to clipboard");
        Ok(entry)
    }
}

/// What a poll reads after `entry` is written to the clipboard.
fn expected_readback(entry: &ClipboardEntry) -> ContentHash {
    match &entry.content {
        Content::FileList(paths) => Content::Text(join_paths(paths)).hash(),
        _ => entry.hash,
    }
}
