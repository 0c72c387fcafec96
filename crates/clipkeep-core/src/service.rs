//! The history subsystem as seen by hosts (daemon, CLI, UI).

use crate::clipboard::Clipboard;
use crate::entry::{Candidate, ClipboardEntry, Content, EntryId};
use crate::error::Result;
use crate::persist::{Persistence, Persister};
use crate::restore::RestoreService;
use crate::retention::RetentionPolicy;
use crate::store::{AddKind, HistoryStore};
use crate::watcher::{ClipboardWatcher, PollOutcome};
use std::sync::Arc;
use std::time::Duration;

pub struct ClipboardHistory {
    store: Arc<HistoryStore>,
    watcher: Arc<ClipboardWatcher>,
    restore: RestoreService,
    persister: Persister,
}

impl ClipboardHistory {
    /// Loads persisted history, installs `policy` and prunes before anything
    /// can be queried. An unreadable backend starts an empty history.
    pub fn open(
        persistence: Arc<dyn Persistence>,
        clipboard: Arc<dyn Clipboard>,
        policy: RetentionPolicy,
        io_timeout: Duration,
    ) -> Result<Self> {
        let (snapshot, persister) = match persistence.load() {
            Ok(s) => (s, Persister::spawn(persistence)?),
            Err(e) => {
                tracing::warn!(error = %e, "could not load history; starting empty, saving disabled");
                (
                    Default::default(),
                    Persister::disabled(format!("history was not loaded ({e}); changes are not saved")),
                )
            }
        };
        let loaded = snapshot.entries.len();
        let store = Arc::new(HistoryStore::from_snapshot(snapshot, policy));
        let evicted = store.prune();
        if evicted > 0 {
            persister.submit(store.snapshot());
        }
        tracing::info!(
            loaded,
            evicted,
            max_items = policy.max_items(),
            expiry_days = policy.expiry_days(),
            "history opened"
        );
        let watcher = Arc::new(ClipboardWatcher::new(clipboard, io_timeout));
        let restore = RestoreService::new(Arc::clone(&store), Arc::clone(&watcher));
        Ok(Self {
            store,
            watcher,
            restore,
            persister,
        })
    }

    fn persist(&self) {
        self.persister.submit(self.store.snapshot());
    }

    /// One synchronous poll, whether or not watching is enabled.
    pub fn check_clipboard(&self) -> PollOutcome {
        let outcome = self.watcher.poll(&self.store);
        if outcome.captured().is_some() {
            self.persist();
        }
        outcome
    }

    /// Scheduled poll; a no-op while watching is disabled.
    pub fn tick(&self) -> PollOutcome {
        let outcome = self.watcher.tick(&self.store);
        if outcome.captured().is_some() {
            self.persist();
        }
        outcome
    }

    /// Records content that did not come from the OS clipboard.
    pub fn add_content(&self, content: Content) -> (ClipboardEntry, AddKind) {
        let added = self.store.add(Candidate::new(content));
        self.persist();
        added
    }

    pub fn get_history(&self) -> Vec<ClipboardEntry> {
        self.store.list()
    }

    pub fn get_item(&self, id: EntryId) -> Result<ClipboardEntry> {
        self.store.get(id)
    }

    pub fn search_history(&self, query: &str) -> Vec<ClipboardEntry> {
        self.store.search(query)
    }

    pub fn copy_item(&self, id: EntryId) -> Result<ClipboardEntry> {
        self.restore.copy(id)
    }

    pub fn clear_history(&self) -> usize {
        let n = self.store.clear();
        tracing::info!(removed = n, "history cleared");
        self.persist();
        n
    }

    pub fn remove_item(&self, id: EntryId) -> Result<ClipboardEntry> {
        let removed = self.store.remove(id)?;
        self.persist();
        Ok(removed)
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.store.policy()
    }

    /// Existing entries are only evicted by the next prune or capture.
    pub fn update_retention(&self, policy: RetentionPolicy) {
        self.store.set_policy(policy);
        tracing::info!(
            max_items = policy.max_items(),
            expiry_days = policy.expiry_days(),
            "retention updated"
        );
    }

    pub fn prune_now(&self) -> usize {
        let evicted = self.store.prune();
        if evicted > 0 {
            self.persist();
        }
        evicted
    }

    pub fn set_watching(&self, enabled: bool) {
        self.watcher.set_enabled(enabled);
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_enabled()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Waits until every change so far has reached the backend (or failed).
    pub fn flush(&self) {
        self.persister.flush();
    }

    pub fn persistence_error(&self) -> Option<String> {
        self.persister.last_error()
    }
}
