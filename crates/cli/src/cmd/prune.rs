//! `sst prune`: age out the previous-value backup.

use std::time::Duration;

use anyhow::{Context, Result};

use sharedstate_lib::SharedStore;

use crate::output::{OutputFormat, print_info, print_json, print_success};

pub fn cmd_prune(store: &SharedStore, older_than: Duration, output: OutputFormat) -> Result<()> {
  let backup = store.backup_path();
  let removed = store
    .prune_backup(older_than)
    .with_context(|| format!("Failed to prune {}", backup.display()))?;

  if output.is_json() {
    return print_json(&serde_json::json!({ "removed": removed, "backup_path": backup }));
  }

  if removed {
    print_success(&format!("Removed backup {}", backup.display()));
  } else {
    print_info(&format!("No backup older than {} to remove", humantime::format_duration(older_than)));
  }
  Ok(())
}
