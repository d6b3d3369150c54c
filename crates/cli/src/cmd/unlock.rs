//! `sst unlock`: manual recovery of a lock token left behind by a crashed holder.

use anyhow::{Result, bail};

use sharedstate_lib::lock::process_alive;
use sharedstate_lib::{LockStrategy, SharedStore};

use crate::output::{OutputFormat, print_info, print_json, print_success};
use crate::prompts::confirm;

pub fn cmd_unlock(store: &SharedStore, force: bool, output: OutputFormat) -> Result<()> {
  let lock = store.lock();

  if !lock.is_held() {
    if output.is_json() {
      print_json(&serde_json::json!({ "removed": false, "lock_path": lock.path() }))?;
    } else {
      print_info("Lock is free; nothing to remove");
    }
    return Ok(());
  }

  if lock.strategy() == LockStrategy::Flock {
    bail!(
      "Lock {} is held by a running process; OS locks are released when their holder exits",
      lock.path().display()
    );
  }

  let holder = lock.holder();
  if let Some(holder) = &holder
    && holder.is_local()
    && process_alive(holder.pid) == Some(true)
    && !force
  {
    bail!(
      "Lock is held by running process {} (PID {}). Use --force to remove it anyway.",
      holder.command,
      holder.pid
    );
  }

  if !confirm(&format!("Remove lock file {}?", lock.path().display()), force)? {
    print_info("Aborted");
    return Ok(());
  }

  lock.release();

  if output.is_json() {
    print_json(&serde_json::json!({ "removed": true, "lock_path": lock.path(), "holder": holder }))?;
  } else {
    print_success(&format!("Removed lock file {}", lock.path().display()));
  }
  Ok(())
}
