//! Shared state store.
//!
//! A [`SharedStore`] holds one JSON value at a well-known path and lets
//! independent processes replace it under a cross-process lock.
//!
//! # Storage Layout
//!
//! ```text
//! {dir}/
//! ├── shared_stats.json        # the current value, replaced wholesale on save
//! ├── shared_stats.json.lock   # lock token, present while a writer holds it
//! ├── shared_stats.json.bak    # previous value, only with `keep_backup`
//! └── .shared_stats.json.*.tmp # in-flight write, renamed over the value
//! ```
//!
//! Writes go to a temporary file in the same directory and are renamed over
//! the value file, so readers never observe a partially written value.
//! With [`StoreOptions::keep_backup`] the value being replaced is kept as the
//! backup, and a corrupt value is read from there instead.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{ReadMode, StoreOptions};
use crate::consts::{BACKUP_SUFFIX, LOCK_SUFFIX};
use crate::error::StoreError;
use crate::lock::{LockFile, LockGuard};

/// The conventional shape of a shared value: string keys to arbitrary JSON.
pub type SharedMap = serde_json::Map<String, serde_json::Value>;

/// Returns the lock path paired with `value_path`.
pub fn lock_path_for(value_path: &Path) -> PathBuf {
  with_suffix(value_path, LOCK_SUFFIX)
}

/// Returns the backup path paired with `value_path`.
pub fn backup_path_for(value_path: &Path) -> PathBuf {
  with_suffix(value_path, BACKUP_SUFFIX)
}

/// Handle to a shared value file and its lock.
///
/// Handles are cheap to clone and hold no state besides paths and options, so
/// any number of them, in any number of processes, can point at the same file.
#[derive(Debug, Clone)]
pub struct SharedStore {
  value_path: PathBuf,
  lock: LockFile,
  options: StoreOptions,
}

impl SharedStore {
  pub fn new(value_path: impl Into<PathBuf>) -> Self {
    Self::with_options(value_path, StoreOptions::default())
  }

  pub fn with_options(value_path: impl Into<PathBuf>, options: StoreOptions) -> Self {
    let value_path = value_path.into();
    let lock = build_lock(lock_path_for(&value_path), &options);
    SharedStore {
      value_path,
      lock,
      options,
    }
  }

  /// Uses `lock_path` instead of the derived `<value>.lock`.
  pub fn with_lock_path(mut self, lock_path: impl Into<PathBuf>) -> Self {
    self.lock = build_lock(lock_path.into(), &self.options);
    self
  }

  pub fn value_path(&self) -> &Path {
    &self.value_path
  }

  pub fn lock_path(&self) -> &Path {
    self.lock.path()
  }

  pub fn options(&self) -> &StoreOptions {
    &self.options
  }

  /// The lock guarding this store, for diagnostics and manual recovery.
  pub fn lock(&self) -> &LockFile {
    &self.lock
  }

  pub fn backup_path(&self) -> PathBuf {
    backup_path_for(&self.value_path)
  }

  pub fn exists(&self) -> bool {
    self.value_path.exists()
  }

  /// Replaces the stored value, waiting up to the configured lock timeout.
  pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StoreError> {
    self.save_with_timeout(value, self.options.lock_timeout)
  }

  /// Replaces the stored value, waiting up to `timeout` for the lock.
  ///
  /// On [`StoreError::LockTimeout`] nothing has been written.
  pub fn save_with_timeout<T: Serialize + ?Sized>(&self, value: &T, timeout: Duration) -> Result<(), StoreError> {
    let guard = self.lock_within(timeout)?;
    let result = self.write_value(value);
    guard.release();

    if result.is_ok() {
      debug!(path = %self.value_path.display(), "shared value saved");
    }
    result
  }

  /// Reads the stored value.
  ///
  /// Returns `default` when the file is missing, unreadable or does not
  /// decode as `T`. A missing file never touches the lock.
  pub fn load<T: DeserializeOwned>(&self, default: T) -> T {
    if !self.value_path.exists() {
      debug!(path = %self.value_path.display(), "no shared value yet, using default");
      return default;
    }

    let _guard = match self.options.read_mode {
      ReadMode::Unlocked => None,
      ReadMode::Locked => match self.lock.acquire(self.options.lock_timeout) {
        Ok(Some(guard)) => Some(guard),
        Ok(None) => {
          warn!(
            path = %self.value_path.display(),
            lock = %self.lock.path().display(),
            "lock busy during read, using default"
          );
          return default;
        }
        Err(e) => {
          warn!(path = %self.value_path.display(), error = %e, "could not lock for read, using default");
          return default;
        }
      },
    };

    self.read_current().unwrap_or_else(|| {
      debug!(path = %self.value_path.display(), "no usable shared value, using default");
      default
    })
  }

  /// Reads the stored value, falling back to `T::default()`.
  pub fn load_or_default<T: DeserializeOwned + Default>(&self) -> T {
    self.load(T::default())
  }

  /// Runs a read-modify-write cycle under a single lock hold.
  ///
  /// The current value (or `default` if there is none usable) is passed to `f`
  /// and the result is saved. Returns the value that was written.
  pub fn update<T, F>(&self, default: T, f: F) -> Result<T, StoreError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    let guard = self.lock_within(self.options.lock_timeout)?;

    let mut value = self.read_current().unwrap_or(default);
    f(&mut value);
    let result = self.write_value(&value);
    guard.release();

    result.map(|()| {
      debug!(path = %self.value_path.display(), "shared value updated");
      value
    })
  }

  /// Deletes the backup if it was last written more than `older_than` ago.
  ///
  /// Returns whether a backup was removed. Runs under the lock so it cannot
  /// race a save that is replacing the backup.
  pub fn prune_backup(&self, older_than: Duration) -> Result<bool, StoreError> {
    let backup = self.backup_path();
    let guard = self.lock_within(self.options.lock_timeout)?;

    let result = match fs::metadata(&backup) {
      Ok(meta) => {
        let age = meta
          .modified()
          .ok()
          .and_then(|modified| SystemTime::now().duration_since(modified).ok())
          .unwrap_or_default();
        if age > older_than {
          fs::remove_file(&backup).map(|()| true)
        } else {
          Ok(false)
        }
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e),
    };
    guard.release();

    let removed = result.map_err(|e| StoreError::storage(&backup, e))?;
    if removed {
      debug!(path = %backup.display(), "old backup removed");
    }
    Ok(removed)
  }

  fn lock_within(&self, timeout: Duration) -> Result<LockGuard, StoreError> {
    match self.lock.acquire(timeout)? {
      Some(guard) => Ok(guard),
      None => {
        let holder = self.lock.holder();
        warn!(
          lock = %self.lock.path().display(),
          timeout_ms = timeout.as_millis() as u64,
          holder_pid = ?holder.as_ref().map(|h| h.pid),
          "timed out waiting for shared state lock"
        );
        Err(StoreError::LockTimeout {
          lock_path: self.lock.path().to_path_buf(),
          timeout,
          holder,
        })
      }
    }
  }

  /// The current value, or the backup when the current value is unusable and
  /// backups are enabled.
  fn read_current<T: DeserializeOwned>(&self) -> Option<T> {
    if let Some(value) = read_json(&self.value_path) {
      return Some(value);
    }
    if !self.options.keep_backup {
      return None;
    }

    let backup = self.backup_path();
    let value = read_json(&backup)?;
    warn!(path = %self.value_path.display(), backup = %backup.display(), "using backup of shared value");
    Some(value)
  }

  fn write_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(value).map_err(StoreError::Encode)?;

    let dir = parent_dir(&self.value_path);
    fs::create_dir_all(dir).map_err(|e| StoreError::storage(dir, e))?;

    let prefix = format!(
      ".{}.",
      self
        .value_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
    );
    let mut temp = tempfile::Builder::new()
      .prefix(&prefix)
      .suffix(".tmp")
      .tempfile_in(dir)
      .map_err(|e| StoreError::storage(dir, e))?;

    temp
      .write_all(&content)
      .and_then(|()| temp.as_file().sync_all())
      .map_err(|e| StoreError::storage(temp.path(), e))?;

    if self.options.keep_backup {
      self.back_up_current();
    }

    temp
      .persist(&self.value_path)
      .map_err(|e| StoreError::storage(&self.value_path, e.error))?;

    Ok(())
  }

  /// Links the value about to be replaced to the backup path. The rename in
  /// `write_value` then swaps a new file in, leaving the backup on the old one.
  /// A failed backup never fails the save.
  fn back_up_current(&self) {
    let backup = self.backup_path();
    if let Err(e) = fs::remove_file(&backup)
      && e.kind() != io::ErrorKind::NotFound
    {
      warn!(path = %backup.display(), error = %e, "failed to replace backup");
      return;
    }

    let result = match fs::hard_link(&self.value_path, &backup) {
      Err(e) if e.kind() == io::ErrorKind::NotFound => return,
      // Some filesystems have no hard links.
      Err(_) => fs::copy(&self.value_path, &backup).map(|_| ()),
      ok => ok,
    };
    if let Err(e) = result {
      warn!(path = %backup.display(), error = %e, "failed to back up shared value");
    }
  }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
  let bytes = match fs::read(path) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
    Err(e) => {
      warn!(path = %path.display(), error = %e, "shared value unreadable");
      return None;
    }
  };

  match serde_json::from_slice(&bytes) {
    Ok(value) => {
      debug!(path = %path.display(), bytes = bytes.len(), "shared value loaded");
      Some(value)
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "shared value corrupt");
      None
    }
  }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path.as_os_str().to_owned();
  name.push(suffix);
  PathBuf::from(name)
}

fn build_lock(path: PathBuf, options: &StoreOptions) -> LockFile {
  LockFile::new(path)
    .with_strategy(options.lock_strategy)
    .with_retry_interval(options.retry_interval)
    .with_stale_after(options.stale_after)
    .with_command(options.lock_label.clone())
}

fn parent_dir(path: &Path) -> &Path {
  match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  }
}
