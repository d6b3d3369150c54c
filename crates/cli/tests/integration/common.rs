//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the shared value and
/// its lock file.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn value_path(&self) -> PathBuf {
    self.temp.path().join("shared_stats.json")
  }

  pub fn lock_path(&self) -> PathBuf {
    self.temp.path().join("shared_stats.json.lock")
  }

  /// Write the shared value file directly, bypassing the lock.
  pub fn write_value(&self, content: &str) {
    std::fs::write(self.value_path(), content).unwrap();
  }

  /// Parse the shared value file.
  pub fn read_value(&self) -> Value {
    let content = std::fs::read_to_string(self.value_path()).unwrap();
    serde_json::from_str(&content).unwrap()
  }

  /// Get a Command for the sst binary pointed at this environment.
  pub fn sst_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("sst");
    cmd
      .env_remove("RUST_LOG")
      .env_remove("SHAREDSTATE_KEEP_BACKUP")
      .env("SHAREDSTATE_FILE", self.value_path())
      .env("SHAREDSTATE_RETRY_INTERVAL_MS", "10");
    cmd
  }
}
