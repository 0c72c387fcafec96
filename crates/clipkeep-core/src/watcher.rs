//! Clipboard change detection.
//!
//! The watcher owns the fingerprint of the last clipboard content it saw. It
//! starts out empty, is replaced on every successful poll, and is replaced by
//! [`crate::restore::RestoreService`] after every successful restore. All of
//! that happens under one mutex, which is also what serializes the scheduled
//! tick against on-demand checks.

use crate::clipboard::{Clipboard, TimedClipboard};
use crate::entry::{Candidate, ClipboardEntry, ContentHash};
use crate::store::{AddKind, HistoryStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Captured { entry: ClipboardEntry, kind: AddKind },
    /// Same fingerprint as last time; the store was not consulted.
    Unchanged,
    Empty,
    /// Scheduled tick while watching is switched off.
    Disabled,
    /// Clipboard could not be read this cycle.
    Skipped(String),
}

impl PollOutcome {
    pub fn captured(&self) -> Option<&ClipboardEntry> {
        match self {
            PollOutcome::Captured { entry, .. } => Some(entry),
            _ => None,
        }
    }
}

#[derive(Default)]
struct WatchState {
    last_seen: Option<ContentHash>,
}

pub struct ClipboardWatcher {
    clipboard: TimedClipboard,
    state: Mutex<WatchState>,
    enabled: AtomicBool,
}

impl ClipboardWatcher {
    pub fn new(clipboard: Arc<dyn Clipboard>, io_timeout: Duration) -> Self {
        Self {
            clipboard: TimedClipboard::new(clipboard, io_timeout),
            state: Mutex::new(WatchState::default()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            tracing::info!(enabled, "clipboard watching toggled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> Option<ContentHash> {
        self.lock_state().last_seen
    }

    /// Scheduled entry point. Honors the enabled flag.
    pub fn tick(&self, store: &HistoryStore) -> PollOutcome {
        if !self.is_enabled() {
            return PollOutcome::Disabled;
        }
        self.poll(store)
    }

    /// On-demand entry point. Returns once any resulting store mutation has
    /// completed.
    pub fn poll(&self, store: &HistoryStore) -> PollOutcome {
        let mut state = self.lock_state();
        let content = match self.clipboard.read() {
            Ok(Some(c)) => c,
            Ok(None) => {
                state.last_seen = None;
                return PollOutcome::Empty;
            }
            Err(e) => {
                tracing::debug!(error = %e, "clipboard read skipped");
                return PollOutcome::Skipped(e.to_string());
            }
        };
        let candidate = Candidate::new(content);
        if state.last_seen == Some(candidate.hash) {
            return PollOutcome::Unchanged;
        }
        state.last_seen = Some(candidate.hash);
        let (entry, kind) = store.add(candidate);
        tracing::info!(id = %entry.id, content_type = %entry.content_type, ?kind, "clipboard captured");
        PollOutcome::Captured { entry, kind }
    }

    /// Exclusive access to the clipboard and the last-seen fingerprint. Polls
    /// wait while the guard is held.
    pub fn lock(&self) -> WatcherGuard<'_> {
        WatcherGuard {
            state: self.lock_state(),
            clipboard: &self.clipboard,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct WatcherGuard<'a> {
    state: MutexGuard<'a, WatchState>,
    clipboard: &'a TimedClipboard,
}

impl WatcherGuard<'_> {
    pub fn clipboard(&self) -> &dyn Clipboard {
        self.clipboard
    }

    pub fn mark_seen(&mut self, hash: ContentHash) {
        self.state.last_seen = Some(hash);
    }

    /// A timed-out call is still running and may yet change the clipboard.
    pub fn call_pending(&self) -> bool {
        self.clipboard.in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::clipboard::DEFAULT_IO_TIMEOUT;

    fn setup() -> (Arc<MemoryClipboard>, ClipboardWatcher, HistoryStore) {
        let mem = Arc::new(MemoryClipboard::new());
        let watcher = ClipboardWatcher::new(mem.clone(), DEFAULT_IO_TIMEOUT);
        (mem, watcher, HistoryStore::default())
    }

    #[test]
    fn unchanged_content_does_not_touch_the_store() {
        let (mem, watcher, store) = setup();
        mem.set_text("A");
        assert!(watcher.poll(&store).captured().is_some());
        let gen = store.generation();
        assert_eq!(watcher.poll(&store), PollOutcome::Unchanged);
        assert_eq!(store.generation(), gen);
    }

    #[test]
    fn locked_clipboard_skips_the_cycle() {
        let (mem, watcher, store) = setup();
        mem.set_text("A");
        mem.set_failing(true);
        assert!(matches!(watcher.poll(&store), PollOutcome::Skipped(_)));
        assert!(store.is_empty());
        mem.set_failing(false);
        assert!(watcher.poll(&store).captured().is_some());
    }

    #[test]
    fn disabled_tick_does_nothing_but_poll_still_works() {
        let (mem, watcher, store) = setup();
        mem.set_text("A");
        watcher.set_enabled(false);
        assert_eq!(watcher.tick(&store), PollOutcome::Disabled);
        assert!(store.is_empty());
        assert!(watcher.poll(&store).captured().is_some());
    }

    #[test]
    fn concurrent_checks_capture_a_change_once() {
        let (mem, watcher, store) = setup();
        let watcher = Arc::new(watcher);
        let store = Arc::new(store);
        mem.set_text("only once");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let w = watcher.clone();
                let s = store.clone();
                std::thread::spawn(move || w.poll(&s))
            })
            .collect();
        let captured = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.captured().is_some())
            .count();
        assert_eq!(captured, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_clipboard_resets_last_seen() {
        let (mem, watcher, store) = setup();
        mem.set_text("A");
        watcher.poll(&store);
        assert!(watcher.last_seen().is_some());
        mem.clear();
        assert_eq!(watcher.poll(&store), PollOutcome::Empty);
        assert!(watcher.last_seen().is_none());
    }
}
