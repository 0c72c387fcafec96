use clipkeep_core::config::{load_settings_from, DEFAULT_POLL_MS};
use clipkeep_core::{RetentionPolicy, Settings};
use tempfile::tempdir;

#[test]
fn missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let s = load_settings_from(&dir.path().join("nope.toml"));
    assert_eq!(s, Settings::default());
    assert_eq!(s.watcher.poll_ms, DEFAULT_POLL_MS);
}

#[test]
fn malformed_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "[retention\nmax_items = ").unwrap();
    assert_eq!(load_settings_from(&path), Settings::default());
}

#[test]
fn file_values_are_used() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(
        &path,
        "[retention]\nmax_items = 7\nexpiry_days = 0\n\n[watcher]\nenabled = false\n\n[storage]\ndb_path = \"/tmp/x.db\"\n",
    )
    .unwrap();
    let s = load_settings_from(&path);
    assert_eq!(s.retention_policy(), RetentionPolicy::new(7, 0).unwrap());
    assert!(!s.watcher.enabled);
    assert_eq!(s.db_path(), std::path::PathBuf::from("/tmp/x.db"));
}

#[test]
fn negative_values_fall_back_to_default_policy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "[retention]\nmax_items = -1\n").unwrap();
    let s = load_settings_from(&path);
    assert_eq!(s.retention_policy(), RetentionPolicy::default());
}
