//! Status command implementation.
//!
//! Shows where the shared value lives, whether its lock is held, and who
//! holds it according to the lock metadata.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use sharedstate_lib::lock::process_alive;
use sharedstate_lib::{LockMetadata, ReadMode, SharedMap, SharedStore};

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success, print_warning,
};

#[derive(Debug, Serialize)]
struct StatusReport {
  value_path: PathBuf,
  lock_path: PathBuf,
  strategy: &'static str,
  value_exists: bool,
  value_bytes: Option<u64>,
  keys: Option<usize>,
  backup_path: Option<PathBuf>,
  locked: bool,
  lock_age_secs: Option<u64>,
  holder: Option<LockMetadata>,
  holder_alive: Option<bool>,
}

impl StatusReport {
  fn collect(store: &SharedStore) -> Self {
    let lock = store.lock();
    let value_exists = store.exists();
    let locked = lock.is_held();
    let holder = if locked { lock.holder() } else { None };
    let backup = store.backup_path();
    let holder_alive = holder
      .as_ref()
      .filter(|h| h.is_local())
      .and_then(|h| process_alive(h.pid));

    StatusReport {
      value_path: display_path(store.value_path()),
      lock_path: display_path(lock.path()),
      strategy: lock.strategy().as_str(),
      value_exists,
      value_bytes: fs::metadata(store.value_path()).ok().map(|m| m.len()),
      keys: value_exists.then(|| count_keys(store)),
      backup_path: backup.exists().then(|| display_path(&backup)),
      locked,
      lock_age_secs: if locked { lock.age().map(|a| a.as_secs()) } else { None },
      holder,
      holder_alive,
    }
  }
}

/// Status reports on the lock, so it never waits for it.
fn count_keys(store: &SharedStore) -> usize {
  let unlocked = SharedStore::with_options(store.value_path(), store.options().clone().with_read_mode(ReadMode::Unlocked));
  unlocked.load_or_default::<SharedMap>().len()
}

fn display_path(path: &Path) -> PathBuf {
  dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub fn cmd_status(store: &SharedStore, verbose: bool, output: OutputFormat) -> Result<()> {
  let report = StatusReport::collect(store);

  if output.is_json() {
    return print_json(&report);
  }

  if report.value_exists {
    print_success(&format!("Shared state: {}", report.value_path.display()));
    if let Some(bytes) = report.value_bytes {
      print_stat("Size", &format_bytes(bytes));
    }
    if let Some(keys) = report.keys {
      print_stat("Keys", &keys.to_string());
    }
    if let Some(backup) = &report.backup_path {
      print_stat("Backup", &backup.display().to_string());
    }
  } else {
    print_info(&format!("No shared state yet at {}", report.value_path.display()));
  }

  println!();
  if !report.locked {
    print_info(&format!("Lock is free ({})", report.strategy));
    if verbose {
      print_stat("Lock file", &report.lock_path.display().to_string());
    }
    return Ok(());
  }

  print_warning(&format!("Lock is held ({})", report.strategy));
  print_stat("Lock file", &report.lock_path.display().to_string());
  if let Some(age) = report.lock_age_secs {
    print_stat("Held for", &format_duration(Duration::from_secs(age)));
  }
  match &report.holder {
    Some(holder) => {
      print_stat("Holder", &format!("{} (PID {})", holder.command, holder.pid));
      if let Some(host) = &holder.hostname {
        print_stat("Host", host);
      }
      match report.holder_alive {
        Some(true) => print_stat("Process", "running"),
        Some(false) => print_stat("Process", "gone (lock is orphaned, see 'sst unlock')"),
        None => print_stat("Process", "unknown"),
      }
    }
    None => print_stat("Holder", "unknown (no readable metadata)"),
  }

  Ok(())
}
