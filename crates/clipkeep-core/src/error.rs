use crate::entry::EntryId;

/// Failures surfaced by the history core.
///
/// None of these are fatal to the hosting process: clipboard and persistence
/// failures are retried on the next cycle, and `ConfigInvalid` is answered by
/// falling back to defaults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entry {0} not found")]
    NotFound(EntryId),
    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

impl Error {
    /// Stable machine-readable name, used on the daemon wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::ClipboardUnavailable(_) => "clipboard_unavailable",
            Error::Persistence(_) => "persistence",
            Error::ConfigInvalid(_) => "config_invalid",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ClipboardUnavailable(_) | Error::Persistence(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
