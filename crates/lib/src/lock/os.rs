//! Platform hooks: OS advisory locks, file identity, process liveness and host identity.

use std::fs::{File, Metadata};
use std::io;
use std::time::SystemTime;

/// One incarnation of a file at a path.
///
/// Inode numbers are reused as soon as a file is deleted, so the timestamps
/// are part of the identity: a token that is removed and created again compares
/// unequal even when it lands on the same inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
  dev: u64,
  ino: u64,
  created: Option<SystemTime>,
  modified: Option<SystemTime>,
}

#[cfg(unix)]
pub fn file_identity(meta: &Metadata) -> FileIdentity {
  use std::os::unix::fs::MetadataExt;

  FileIdentity {
    dev: meta.dev(),
    ino: meta.ino(),
    created: meta.created().ok(),
    modified: meta.modified().ok(),
  }
}

// The stable std API exposes no file index on Windows; creation time carries
// the distinction there.
#[cfg(windows)]
pub fn file_identity(meta: &Metadata) -> FileIdentity {
  FileIdentity {
    dev: 0,
    ino: 0,
    created: meta.created().ok(),
    modified: meta.modified().ok(),
  }
}

#[cfg(unix)]
pub fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
pub fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result != 0 {
    return Ok(());
  }

  let err = io::Error::last_os_error();
  if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
    Err(io::Error::from(io::ErrorKind::WouldBlock))
  } else {
    Err(err)
  }
}

/// Whether `pid` names a live process on this host.
///
/// `None` when liveness cannot be determined.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> Option<bool> {
  use rustix::io::Errno;
  use rustix::process::{Pid, test_kill_process};

  let pid = Pid::from_raw(i32::try_from(pid).ok()?)?;
  match test_kill_process(pid) {
    Ok(()) => Some(true),
    Err(Errno::PERM) => Some(true),
    Err(Errno::SRCH) => Some(false),
    Err(_) => None,
  }
}

#[cfg(windows)]
pub fn process_alive(_pid: u32) -> Option<bool> {
  None
}

#[cfg(unix)]
pub fn hostname() -> Option<String> {
  let uname = rustix::system::uname();
  uname.nodename().to_str().ok().map(str::to_owned)
}

#[cfg(windows)]
pub fn hostname() -> Option<String> {
  std::env::var("COMPUTERNAME").ok()
}
