//! Error types for the lock primitive and the shared store.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::lock::LockMetadata;

/// I/O failures while trying to take a lock.
///
/// Ordinary contention is never an error; it is reported as "not acquired".
#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to create lock directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create lock token {path}: {source}")]
  CreateToken {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file {path}: {source}")]
  OpenFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock {path}: {source}")]
  LockFailed {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl LockError {
  pub fn path(&self) -> &Path {
    match self {
      LockError::CreateDir { path, .. }
      | LockError::CreateToken { path, .. }
      | LockError::OpenFile { path, .. }
      | LockError::LockFailed { path, .. } => path,
    }
  }

  fn into_parts(self) -> (PathBuf, io::Error) {
    match self {
      LockError::CreateDir { path, source }
      | LockError::CreateToken { path, source }
      | LockError::OpenFile { path, source }
      | LockError::LockFailed { path, source } => (path, source),
    }
  }
}

/// Failures surfaced by [`SharedStore`](crate::store::SharedStore) writes.
///
/// Loads never fail: a missing or unreadable value degrades to the caller's default.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error(
    "timed out after {} waiting for lock {lock_path}{}\n\
     If you're sure no cooperating process is running, remove the lock file:\n  {lock_path}",
    humanize(.timeout),
    describe_holder(.holder)
  )]
  LockTimeout {
    lock_path: PathBuf,
    timeout: Duration,
    holder: Option<LockMetadata>,
  },

  #[error("shared state storage unavailable at {path}: {source}")]
  StorageUnavailable {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to encode shared value: {0}")]
  Encode(#[source] serde_json::Error),
}

impl StoreError {
  /// Whether retrying the same operation later may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, StoreError::LockTimeout { .. })
  }

  pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
    StoreError::StorageUnavailable {
      path: path.into(),
      source,
    }
  }
}

impl From<LockError> for StoreError {
  fn from(err: LockError) -> Self {
    let (path, source) = err.into_parts();
    StoreError::StorageUnavailable { path, source }
  }
}

fn humanize(timeout: &Duration) -> String {
  format!("{}ms", timeout.as_millis())
}

fn describe_holder(holder: &Option<LockMetadata>) -> String {
  match holder {
    Some(meta) => format!(" (held by {} PID {}, since unix {})", meta.command, meta.pid, meta.acquired_at_unix),
    None => String::new(),
  }
}
