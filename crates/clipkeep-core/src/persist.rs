//! Durable storage of the history and the background writer that feeds it.

use crate::error::{Error, Result};
use crate::store::Snapshot;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub trait Persistence: Send + Sync {
    fn load(&self) -> Result<Snapshot>;
    fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Keeps nothing; every start is a fresh history.
#[derive(Default)]
pub struct NoPersistence;

impl Persistence for NoPersistence {
    fn load(&self) -> Result<Snapshot> {
        Ok(Snapshot::default())
    }
    fn save(&self, _snapshot: &Snapshot) -> Result<()> {
        Ok(())
    }
}

/// In-memory persistence with a failure switch, for tests.
#[derive(Default)]
pub struct MemPersistence {
    saved: Mutex<Option<Snapshot>>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let p = Self::default();
        *p.slot() = Some(snapshot);
        p
    }

    pub fn saved(&self) -> Option<Snapshot> {
        self.slot().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Snapshot>> {
        self.saved.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Persistence for MemPersistence {
    fn load(&self) -> Result<Snapshot> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("load failed".into()));
        }
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk full".into()));
        }
        *self.slot() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

enum Msg {
    Save(Snapshot),
    Flush(mpsc::Sender<()>),
}

/// Background writer. Snapshots arrive after the mutation they reflect has
/// completed; bursts coalesce to the newest generation and a generation
/// older than one already written is never saved.
pub struct Persister {
    tx: Option<mpsc::Sender<Msg>>,
    join: Option<JoinHandle<()>>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Persister {
    pub fn spawn(backend: Arc<dyn Persistence>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Msg>();
        let last_error = Arc::new(Mutex::new(None));
        let errors = Arc::clone(&last_error);
        let join = std::thread::Builder::new()
            .name("clipkeep-persist".into())
            .spawn(move || writer_loop(backend, rx, errors))?;
        Ok(Self {
            tx: Some(tx),
            join: Some(join),
            last_error,
        })
    }

    /// A writer that saves nothing and reports `reason` as its error. Used
    /// when the backend's contents were never read: diffing an unread id
    /// space against it would overwrite or delete stored rows.
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            tx: None,
            join: None,
            last_error: Arc::new(Mutex::new(Some(reason.into()))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub fn submit(&self, snapshot: Snapshot) {
        if let Some(tx) = &self.tx {
            if tx.send(Msg::Save(snapshot)).is_err() {
                tracing::warn!("persistence writer is gone; snapshot dropped");
            }
        }
    }

    /// Blocks until everything submitted so far has been handled.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = mpsc::channel();
        if tx.send(Msg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Message of the most recent failed save, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn writer_loop(
    backend: Arc<dyn Persistence>,
    rx: mpsc::Receiver<Msg>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    let mut written: Option<u64> = None;
    while let Ok(first) = rx.recv() {
        let mut pending: Option<Snapshot> = None;
        let mut acks = Vec::new();
        for msg in std::iter::once(first).chain(rx.try_iter()) {
            match msg {
                Msg::Save(s) => {
                    if pending.as_ref().map_or(true, |p| s.generation >= p.generation) {
                        pending = Some(s);
                    }
                }
                Msg::Flush(ack) => acks.push(ack),
            }
        }
        if let Some(snapshot) = pending {
            if written.map_or(true, |g| snapshot.generation > g) {
                let result = backend.save(&snapshot);
                let mut err = last_error.lock().unwrap_or_else(|p| p.into_inner());
                match result {
                    Ok(()) => {
                        written = Some(snapshot.generation);
                        *err = None;
                        tracing::debug!(
                            generation = snapshot.generation,
                            entries = snapshot.entries.len(),
                            "history saved"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "saving history failed; will retry on next change");
                        *err = Some(e.to_string());
                    }
                }
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(generation: u64) -> Snapshot {
        Snapshot {
            entries: Vec::new(),
            next_id: generation + 1,
            generation,
        }
    }

    #[test]
    fn stale_generations_are_never_written() {
        let mem = Arc::new(MemPersistence::new());
        let p = Persister::spawn(mem.clone()).unwrap();
        p.submit(snap(5));
        p.flush();
        p.submit(snap(3));
        p.flush();
        assert_eq!(mem.saved().unwrap().generation, 5);
    }

    #[test]
    fn failures_are_reported_then_cleared() {
        let mem = Arc::new(MemPersistence::new());
        let p = Persister::spawn(mem.clone()).unwrap();
        mem.set_failing(true);
        p.submit(snap(1));
        p.flush();
        assert!(p.last_error().is_some());
        mem.set_failing(false);
        p.submit(snap(2));
        p.flush();
        assert!(p.last_error().is_none());
        assert_eq!(mem.saved().unwrap().generation, 2);
    }

    #[test]
    fn disabled_writer_saves_nothing() {
        let p = Persister::disabled("history not loaded");
        assert!(!p.is_enabled());
        p.submit(snap(1));
        p.flush();
        assert_eq!(p.last_error().as_deref(), Some("history not loaded"));
    }

    #[test]
    fn drop_drains_pending_saves() {
        let mem = Arc::new(MemPersistence::new());
        {
            let p = Persister::spawn(mem.clone()).unwrap();
            p.submit(snap(1));
        }
        assert_eq!(mem.saved().unwrap().generation, 1);
    }
}
