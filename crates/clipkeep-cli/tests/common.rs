#![allow(dead_code)]
use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestEnv {
    _dir: TempDir,
    pub db: PathBuf,
    pub cfg: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = dir.path().join("config");
        std::fs::create_dir_all(&cfg).expect("cfg dir");
        let db = dir.path().join("clipkeep.db");
        Self { _dir: dir, db, cfg }
    }

    pub fn bin(&self) -> Command {
        let mut cmd = Command::cargo_bin("clipkeep").unwrap();
        cmd.env("XDG_CONFIG_HOME", &self.cfg);
        cmd.env_remove("RUST_LOG");
        cmd.arg("--db").arg(&self.db);
        cmd
    }

    /// Writes a settings file and returns its path.
    pub fn settings(&self, body: &str) -> PathBuf {
        let path = self.cfg.join("settings.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    pub fn add(&self, text: &str) -> String {
        let out = self
            .bin()
            .arg("add")
            .write_stdin(text)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        String::from_utf8(out)
            .unwrap()
            .trim()
            .trim_start_matches("added ")
            .to_string()
    }

    pub fn list_json(&self) -> Vec<serde_json::Value> {
        let out = self
            .bin()
            .args(["list", "--json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
        v.as_array().cloned().unwrap_or_default()
    }

    pub fn previews(&self) -> Vec<String> {
        self.list_json()
            .iter()
            .map(|e| e["preview"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
