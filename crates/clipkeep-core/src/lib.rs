//! clipkeep-core: clipboard capture, bounded history, search and restore

pub mod clipboard;
pub mod config;
pub mod entry;
pub mod error;
pub mod persist;
pub mod restore;
pub mod retention;
pub mod search;
pub mod service;
pub mod store;
pub mod watcher;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use clipboard::{Clipboard, MemoryClipboard, NoopClipboard, TimedClipboard};
pub use config::Settings;
pub use entry::{Candidate, ClipboardEntry, Content, ContentHash, ContentType, EntryId, ImageRgba};
pub use error::{Error, Result};
pub use persist::{MemPersistence, NoPersistence, Persistence};
pub use retention::RetentionPolicy;
pub use service::ClipboardHistory;
pub use store::{AddKind, HistoryStore, Snapshot};
pub use watcher::{ClipboardWatcher, PollOutcome};

#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePersistence;
