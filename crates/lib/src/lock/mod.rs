//! File-based locking for mutual exclusion between processes.
//!
//! # Strategies
//!
//! - [`LockStrategy::Token`]: the *existence* of the lock file is the mutex.
//!   Acquirers race to create it with exclusive-create semantics and the holder
//!   deletes it on release. A holder that crashes leaves the token behind; it
//!   has to be removed by hand, or reclaimed after [`LockFile::with_stale_after`].
//!   Reclaimers take turns through a `<lock>.reclaim` marker and only delete the
//!   exact token they judged stale, so two of them never both succeed.
//! - [`LockStrategy::Flock`]: the lock file is a rendezvous point for an OS
//!   advisory lock (`flock` on unix, `LockFileEx` on Windows). The OS drops the
//!   lock when the holder exits, so nothing is ever orphaned. The file itself
//!   is left in place on release.
//!
//! All cooperating processes must use the same strategy for a given path.
//!
//! # Limitations
//!
//! Locks are not reentrant. A process that already holds a lock and calls
//! [`LockFile::acquire`] again waits on its own lock and times out. There is no
//! fairness between waiters either; the first successful attempt wins.

mod os;

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::{APP_NAME, DEFAULT_RETRY_INTERVAL, LOCK_METADATA_VERSION};
use crate::error::LockError;

pub use os::process_alive;

use os::FileIdentity;

const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);
const RECLAIM_SUFFIX: &str = ".reclaim";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
  #[default]
  Token,
  Flock,
}

impl LockStrategy {
  pub fn as_str(self) -> &'static str {
    match self {
      LockStrategy::Token => "token",
      LockStrategy::Flock => "flock",
    }
  }
}

impl FromStr for LockStrategy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "token" => Ok(LockStrategy::Token),
      "flock" => Ok(LockStrategy::Flock),
      other => Err(format!("unknown lock strategy '{other}' (expected 'token' or 'flock')")),
    }
  }
}

/// Diagnostic record written into the lock file by its holder.
///
/// Nothing in the acquisition path parses this back; it exists for operators
/// and error messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub acquired_at_unix: u64,
  #[serde(default)]
  pub hostname: Option<String>,
  pub command: String,
}

impl LockMetadata {
  fn current(command: &str) -> Self {
    LockMetadata {
      version: LOCK_METADATA_VERSION,
      pid: std::process::id(),
      acquired_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      hostname: os::hostname(),
      command: command.to_string(),
    }
  }

  /// Whether the recorded holder was started on the machine we are running on.
  pub fn is_local(&self) -> bool {
    match (&self.hostname, os::hostname()) {
      (Some(recorded), Some(current)) => *recorded == current,
      _ => false,
    }
  }
}

/// A lock at a fixed path, shared by convention between processes.
#[derive(Debug, Clone)]
pub struct LockFile {
  path: PathBuf,
  strategy: LockStrategy,
  retry_interval: Duration,
  stale_after: Option<Duration>,
  command: String,
}

impl LockFile {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    LockFile {
      path: path.into(),
      strategy: LockStrategy::default(),
      retry_interval: DEFAULT_RETRY_INTERVAL,
      stale_after: None,
      command: APP_NAME.to_string(),
    }
  }

  pub fn with_strategy(mut self, strategy: LockStrategy) -> Self {
    self.strategy = strategy;
    self
  }

  /// Pause between attempts while the lock is contended.
  pub fn with_retry_interval(mut self, interval: Duration) -> Self {
    self.retry_interval = interval;
    self
  }

  /// Treat a token whose modification time is older than `grace` as orphaned
  /// and delete it before retrying.
  ///
  /// Only meaningful for [`LockStrategy::Token`]. `grace` must exceed the
  /// longest critical section any cooperating process runs, otherwise a live
  /// holder can lose its lock.
  pub fn with_stale_after(mut self, grace: Option<Duration>) -> Self {
    self.stale_after = grace;
    self
  }

  /// Label recorded in the lock metadata.
  pub fn with_command(mut self, command: impl Into<String>) -> Self {
    self.command = command.into();
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn strategy(&self) -> LockStrategy {
    self.strategy
  }

  pub fn retry_interval(&self) -> Duration {
    self.retry_interval
  }

  /// Polls for the lock until it is taken or `timeout` has elapsed.
  ///
  /// Returns `Ok(None)` when the lock was still contended after `timeout`.
  /// A zero timeout makes exactly one attempt.
  pub fn acquire(&self, timeout: Duration) -> Result<Option<LockGuard>, LockError> {
    let start = Instant::now();
    let interval = self.retry_interval.max(MIN_RETRY_INTERVAL);
    let mut attempts: u32 = 0;

    loop {
      attempts += 1;
      if let Some(guard) = self.try_acquire()? {
        debug!(
          path = %self.path.display(),
          attempts,
          waited_ms = start.elapsed().as_millis() as u64,
          "lock acquired"
        );
        return Ok(Some(guard));
      }

      let elapsed = start.elapsed();
      if elapsed >= timeout {
        debug!(
          path = %self.path.display(),
          attempts,
          timeout_ms = timeout.as_millis() as u64,
          "lock acquisition timed out"
        );
        return Ok(None);
      }

      thread::sleep(interval.min(timeout - elapsed));
    }
  }

  /// Makes a single attempt to take the lock.
  pub fn try_acquire(&self) -> Result<Option<LockGuard>, LockError> {
    ensure_parent(&self.path)?;

    match self.strategy {
      LockStrategy::Token => self.try_create_token(),
      LockStrategy::Flock => self.try_flock(),
    }
  }

  /// Deletes the lock token.
  ///
  /// Idempotent: a missing token is not an error. Other failures are logged and
  /// swallowed. Under [`LockStrategy::Flock`] this does nothing: the OS lock
  /// belongs to whoever holds the descriptor, and unlinking the rendezvous file
  /// would let the next acquirer lock a fresh inode while the holder keeps the
  /// old one.
  pub fn release(&self) {
    match self.strategy {
      LockStrategy::Token => remove_token(&self.path),
      LockStrategy::Flock => {
        debug!(path = %self.path.display(), "flock is released by its holder; leaving lock file in place");
      }
    }
  }

  /// Whether some process currently holds the lock.
  pub fn is_held(&self) -> bool {
    match self.strategy {
      LockStrategy::Token => self.path.exists(),
      LockStrategy::Flock => {
        let Ok(file) = OpenOptions::new().read(true).write(true).open(&self.path) else {
          return false;
        };
        matches!(os::try_lock_exclusive(&file), Err(e) if e.kind() == io::ErrorKind::WouldBlock)
      }
    }
  }

  /// Best-effort read of the holder's diagnostic metadata.
  pub fn holder(&self) -> Option<LockMetadata> {
    let contents = fs::read_to_string(&self.path).ok()?;
    serde_json::from_str(&contents).ok()
  }

  /// Time since the lock file was last modified.
  pub fn age(&self) -> Option<Duration> {
    age_of(&fs::metadata(&self.path).ok()?)
  }

  fn try_create_token(&self) -> Result<Option<LockGuard>, LockError> {
    if let Some(guard) = self.create_token()? {
      return Ok(Some(guard));
    }

    match self.observe_stale() {
      Some(stale) => self.reclaim(stale),
      None => Ok(None),
    }
  }

  fn create_token(&self) -> Result<Option<LockGuard>, LockError> {
    let file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
      Ok(file) => file,
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
      Err(source) => {
        return Err(LockError::CreateToken {
          path: self.path.clone(),
          source,
        });
      }
    };

    self.write_metadata(&file);
    drop(file);

    // Stat by path once closed, so the times match what other processes see.
    let identity = match fs::metadata(&self.path) {
      Ok(meta) => Some(os::file_identity(&meta)),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "failed to stat new lock token");
        None
      }
    };

    Ok(Some(LockGuard {
      path: self.path.clone(),
      strategy: LockStrategy::Token,
      file: None,
      token: identity,
      released: false,
    }))
  }

  /// The current token, if it is older than the grace period.
  fn observe_stale(&self) -> Option<StaleToken> {
    let grace = self.stale_after?;
    let meta = fs::metadata(&self.path).ok()?;
    let age = age_of(&meta)?;
    (age > grace).then(|| StaleToken {
      identity: os::file_identity(&meta),
      age,
      grace,
    })
  }

  /// Replaces the token observed in `stale` with one of our own.
  ///
  /// The decision is made again under the reclaim marker: if the token is no
  /// longer the one that was observed, another process got there first and
  /// this counts as contention.
  fn reclaim(&self, stale: StaleToken) -> Result<Option<LockGuard>, LockError> {
    let Some(_marker) = ReclaimMarker::take(&self.path, stale.grace)? else {
      return Ok(None);
    };

    match fs::metadata(&self.path) {
      Ok(meta) if os::file_identity(&meta) == stale.identity => {
        warn!(
          path = %self.path.display(),
          age_secs = stale.age.as_secs(),
          grace_secs = stale.grace.as_secs(),
          holder = ?self.holder().map(|m| m.pid),
          "removing stale lock token"
        );
        remove_token(&self.path);
      }
      Ok(_) => {
        debug!(path = %self.path.display(), "stale lock token was already replaced");
        return Ok(None);
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "failed to stat lock token");
        return Ok(None);
      }
    }

    self.create_token()
  }

  fn try_flock(&self) -> Result<Option<LockGuard>, LockError> {
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&self.path)
      .map_err(|source| LockError::OpenFile {
        path: self.path.clone(),
        source,
      })?;

    match os::try_lock_exclusive(&file) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
      Err(source) => {
        return Err(LockError::LockFailed {
          path: self.path.clone(),
          source,
        });
      }
    }

    if let Err(e) = file.set_len(0) {
      warn!(path = %self.path.display(), error = %e, "failed to truncate lock file");
    }
    self.write_metadata(&file);

    Ok(Some(LockGuard {
      path: self.path.clone(),
      strategy: LockStrategy::Flock,
      file: Some(file),
      token: None,
      released: false,
    }))
  }

  /// Metadata is diagnostic only, so a failed write never gives up the lock.
  fn write_metadata(&self, file: &File) {
    let metadata = LockMetadata::current(&self.command);
    let mut writer = io::BufWriter::new(file);
    let result = serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(io::Error::other)
      .and_then(|()| writer.flush());

    if let Err(e) = result {
      warn!(path = %self.path.display(), error = %e, "failed to write lock metadata");
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct StaleToken {
  identity: FileIdentity,
  age: Duration,
  grace: Duration,
}

/// Exclusive right to reclaim the token at a lock path, held as a
/// `<lock>.reclaim` file for the few syscalls a reclaim takes.
struct ReclaimMarker {
  path: PathBuf,
}

impl ReclaimMarker {
  /// `Ok(None)` when another reclaim is in progress. A marker older than
  /// `grace` was left by a reclaimer that died; it is removed so a later
  /// attempt can proceed.
  fn take(lock_path: &Path, grace: Duration) -> Result<Option<Self>, LockError> {
    let mut name = lock_path.as_os_str().to_owned();
    name.push(RECLAIM_SUFFIX);
    let path = PathBuf::from(name);

    match OpenOptions::new().write(true).create_new(true).open(&path) {
      Ok(_) => Ok(Some(ReclaimMarker { path })),
      Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
        let abandoned = fs::metadata(&path).ok().and_then(|m| age_of(&m)).is_some_and(|age| age > grace);
        if abandoned {
          warn!(path = %path.display(), "removing abandoned reclaim marker");
          remove_token(&path);
        }
        Ok(None)
      }
      Err(source) => Err(LockError::CreateToken { path, source }),
    }
  }
}

impl Drop for ReclaimMarker {
  fn drop(&mut self) {
    remove_token(&self.path);
  }
}

/// A held lock. Released when dropped.
#[derive(Debug)]
pub struct LockGuard {
  path: PathBuf,
  strategy: LockStrategy,
  file: Option<File>,
  /// The token this guard created. Release deletes the token only while it is
  /// still this one.
  token: Option<FileIdentity>,
  released: bool,
}

impl LockGuard {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn strategy(&self) -> LockStrategy {
    self.strategy
  }

  /// Releases the lock now instead of at end of scope.
  pub fn release(mut self) {
    self.release_inner();
  }

  fn release_inner(&mut self) {
    if self.released {
      return;
    }
    self.released = true;

    match self.strategy {
      LockStrategy::Token => self.remove_own_token(),
      LockStrategy::Flock => {
        // Closing the descriptor drops the OS lock.
        self.file.take();
      }
    }
    debug!(path = %self.path.display(), "lock released");
  }

  fn remove_own_token(&self) {
    let Some(ours) = self.token else {
      remove_token(&self.path);
      return;
    };

    match fs::metadata(&self.path) {
      Ok(meta) if os::file_identity(&meta) == ours => remove_token(&self.path),
      Ok(_) => warn!(
        path = %self.path.display(),
        "lock token was replaced while held; leaving the new holder's token in place"
      ),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        warn!(path = %self.path.display(), "lock token was removed while held")
      }
      Err(e) => warn!(path = %self.path.display(), error = %e, "failed to stat lock token"),
    }
  }
}

impl Drop for LockGuard {
  fn drop(&mut self) {
    self.release_inner();
  }
}

fn ensure_parent(path: &Path) -> Result<(), LockError> {
  let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
    return Ok(());
  };
  if parent.is_dir() {
    return Ok(());
  }
  fs::create_dir_all(parent).map_err(|source| LockError::CreateDir {
    path: parent.to_path_buf(),
    source,
  })
}

fn age_of(meta: &Metadata) -> Option<Duration> {
  let modified = meta.modified().ok()?;
  Some(SystemTime::now().duration_since(modified).unwrap_or_default())
}

fn remove_token(path: &Path) {
  match fs::remove_file(path) {
    Ok(()) => {}
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => warn!(path = %path.display(), error = %e, "failed to remove lock token"),
  }
}
