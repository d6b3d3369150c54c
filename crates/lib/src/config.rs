//! Store configuration.
//!
//! [`StoreOptions`] carries every tunable of a [`SharedStore`](crate::store::SharedStore).
//! Defaults suit a handful of cooperating processes with short critical sections.
//! [`StoreOptions::from_env`] layers `SHAREDSTATE_*` environment overrides on top.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::consts::{APP_NAME, DEFAULT_LOCK_TIMEOUT, DEFAULT_RETRY_INTERVAL};
use crate::lock::LockStrategy;

pub const ENV_LOCK_TIMEOUT_MS: &str = "SHAREDSTATE_LOCK_TIMEOUT_MS";
pub const ENV_RETRY_INTERVAL_MS: &str = "SHAREDSTATE_RETRY_INTERVAL_MS";
pub const ENV_STALE_AFTER_SECS: &str = "SHAREDSTATE_STALE_AFTER_SECS";
pub const ENV_READ_MODE: &str = "SHAREDSTATE_READ_MODE";
pub const ENV_LOCK_STRATEGY: &str = "SHAREDSTATE_LOCK_STRATEGY";
pub const ENV_KEEP_BACKUP: &str = "SHAREDSTATE_KEEP_BACKUP";

/// How [`SharedStore::load`](crate::store::SharedStore::load) coordinates with writers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
  /// Read without the lock. Writes are atomic renames, so a reader sees either
  /// the previous or the next complete value, never a torn one.
  #[default]
  Unlocked,
  /// Take the lock around reads so they are ordered after in-flight writes.
  Locked,
}

impl FromStr for ReadMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "unlocked" => Ok(ReadMode::Unlocked),
      "locked" => Ok(ReadMode::Locked),
      other => Err(format!("unknown read mode '{other}' (expected 'locked' or 'unlocked')")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
  /// How long `save` and `update` wait for the lock.
  pub lock_timeout: Duration,
  /// Pause between lock attempts.
  pub retry_interval: Duration,
  /// Grace period after which an abandoned token is reclaimed. `None` disables reclaiming.
  pub stale_after: Option<Duration>,
  pub read_mode: ReadMode,
  pub lock_strategy: LockStrategy,
  /// Recorded in lock metadata to identify the holder.
  pub lock_label: String,
  /// Keep the previous value next to the current one as `<value>.bak`, and
  /// read it when the current value is corrupt.
  pub keep_backup: bool,
}

impl Default for StoreOptions {
  fn default() -> Self {
    StoreOptions {
      lock_timeout: DEFAULT_LOCK_TIMEOUT,
      retry_interval: DEFAULT_RETRY_INTERVAL,
      stale_after: None,
      read_mode: ReadMode::default(),
      lock_strategy: LockStrategy::default(),
      lock_label: APP_NAME.to_string(),
      keep_backup: false,
    }
  }
}

impl StoreOptions {
  /// Defaults with `SHAREDSTATE_*` environment overrides applied.
  pub fn from_env() -> Self {
    Self::default().with_env_overrides()
  }

  /// Applies any `SHAREDSTATE_*` variables that are set. Unparsable values are
  /// logged and ignored.
  pub fn with_env_overrides(mut self) -> Self {
    if let Some(ms) = env_parse::<u64>(ENV_LOCK_TIMEOUT_MS) {
      self.lock_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = env_parse::<u64>(ENV_RETRY_INTERVAL_MS) {
      self.retry_interval = Duration::from_millis(ms);
    }
    if let Some(secs) = env_parse::<u64>(ENV_STALE_AFTER_SECS) {
      self.stale_after = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(mode) = env_parse::<ReadMode>(ENV_READ_MODE) {
      self.read_mode = mode;
    }
    if let Some(strategy) = env_parse::<LockStrategy>(ENV_LOCK_STRATEGY) {
      self.lock_strategy = strategy;
    }
    if let Some(Flag(keep)) = env_parse::<Flag>(ENV_KEEP_BACKUP) {
      self.keep_backup = keep;
    }
    self
  }

  pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  pub fn with_retry_interval(mut self, interval: Duration) -> Self {
    self.retry_interval = interval;
    self
  }

  pub fn with_stale_after(mut self, grace: Option<Duration>) -> Self {
    self.stale_after = grace;
    self
  }

  pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
    self.read_mode = mode;
    self
  }

  pub fn with_lock_strategy(mut self, strategy: LockStrategy) -> Self {
    self.lock_strategy = strategy;
    self
  }

  pub fn with_lock_label(mut self, label: impl Into<String>) -> Self {
    self.lock_label = label.into();
    self
  }

  pub fn with_keep_backup(mut self, keep: bool) -> Self {
    self.keep_backup = keep;
    self
  }
}

/// Boolean environment value: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`.
struct Flag(bool);

impl FromStr for Flag {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "1" | "true" | "yes" | "on" => Ok(Flag(true)),
      "0" | "false" | "no" | "off" => Ok(Flag(false)),
      other => Err(format!("expected a boolean, got '{other}'")),
    }
  }
}

fn env_parse<T>(name: &str) -> Option<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  let raw = env::var(name).ok()?;
  match raw.parse::<T>() {
    Ok(value) => Some(value),
    Err(e) => {
      warn!(var = name, value = %raw, error = %e, "ignoring invalid environment override");
      None
    }
  }
}
