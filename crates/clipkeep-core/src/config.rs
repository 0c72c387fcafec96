use crate::clipboard::DEFAULT_IO_TIMEOUT;
use crate::retention::{RetentionPolicy, DEFAULT_EXPIRY_DAYS, DEFAULT_MAX_ITEMS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_POLL_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub retention: Retention,
    pub watcher: Watcher,
    pub storage: Storage,
}

/// Raw values; validated by [`Settings::retention_policy`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Retention {
    pub max_items: i64,
    pub expiry_days: i64,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS as i64,
            expiry_days: DEFAULT_EXPIRY_DAYS as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Watcher {
    /// Polling interval in milliseconds
    pub poll_ms: u64,
    /// Deadline for a single clipboard read or write
    pub timeout_ms: u64,
    pub enabled: bool,
}

impl Default for Watcher {
    fn default() -> Self {
        Self {
            poll_ms: DEFAULT_POLL_MS,
            timeout_ms: DEFAULT_IO_TIMEOUT.as_millis() as u64,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Storage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Settings {
    /// The configured policy, or the defaults when the configured values are
    /// out of range.
    pub fn retention_policy(&self) -> RetentionPolicy {
        match RetentionPolicy::from_raw(self.retention.max_items, self.retention.expiry_days) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "invalid retention settings; using defaults");
                RetentionPolicy::default()
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watcher.poll_ms.max(1))
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.watcher.timeout_ms.max(1))
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage.db_path.clone().unwrap_or_else(default_db_path)
    }

    /// These settings with every value replaced by the one actually in
    /// force: out-of-range retention becomes the defaults, intervals are
    /// clamped, and the database path is resolved.
    pub fn effective(&self) -> Settings {
        let policy = self.retention_policy();
        let mut s = self.clone();
        s.retention.max_items = policy.max_items() as i64;
        s.retention.expiry_days = policy.expiry_days() as i64;
        s.watcher.poll_ms = self.poll_interval().as_millis() as u64;
        s.watcher.timeout_ms = self.io_timeout().as_millis() as u64;
        s.storage.db_path = Some(self.db_path());
        s
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(bd) = directories::BaseDirs::new() {
        bd.config_dir().join("clipkeep")
    } else {
        PathBuf::from("./.config/clipkeep")
    }
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

pub fn default_db_path() -> PathBuf {
    config_dir().join("db").join("clipkeep.db")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// A missing file gives defaults silently; an unreadable or malformed one
/// gives defaults and a warning.
pub fn load_settings_from(path: &Path) -> Settings {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read settings; using defaults");
            return Settings::default();
        }
    };
    match toml::from_str(&text) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "malformed settings; using defaults");
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let s: Settings = toml::from_str("[retention]\nmax_items = 5\n").unwrap();
        assert_eq!(s.retention.max_items, 5);
        assert_eq!(s.retention.expiry_days, DEFAULT_EXPIRY_DAYS as i64);
        assert_eq!(s.watcher, Watcher::default());
        assert_eq!(s.retention_policy().max_items(), 5);
    }

    #[test]
    fn out_of_range_retention_falls_back() {
        let s: Settings = toml::from_str("[retention]\nmax_items = 0\nexpiry_days = -3\n").unwrap();
        assert_eq!(s.retention_policy(), RetentionPolicy::default());
    }

    #[test]
    fn effective_settings_show_the_fallback_values() {
        let s: Settings = toml::from_str("[retention]\nmax_items = -4\n[watcher]\npoll_ms = 0\n").unwrap();
        let eff = s.effective();
        assert_eq!(eff.retention.max_items, 200);
        assert_eq!(eff.retention.expiry_days, DEFAULT_EXPIRY_DAYS as i64);
        assert_eq!(eff.watcher.poll_ms, 1);
        assert!(eff.storage.db_path.is_some());
        assert!(eff.to_toml().contains("max_items = 200"));
        assert_eq!(s.retention.max_items, -4);
    }

    #[test]
    fn toml_output_parses_back() {
        let mut s = Settings::default();
        s.watcher.poll_ms = 42;
        let back: Settings = toml::from_str(&s.to_toml()).unwrap();
        assert_eq!(back, s);
    }
}
