use anyhow::{Context, Result};

use sharedstate_lib::{SharedMap, SharedStore};

use crate::output::{OutputFormat, print_info, print_json, print_success};
use crate::prompts::confirm;

pub fn cmd_clear(store: &SharedStore, force: bool, output: OutputFormat) -> Result<()> {
  let message = format!("Clear all shared state in {}?", store.value_path().display());
  if !confirm(&message, force)? {
    print_info("Aborted");
    return Ok(());
  }

  store
    .save(&SharedMap::new())
    .with_context(|| format!("Failed to clear {}", store.value_path().display()))?;

  if output.is_json() {
    print_json(&serde_json::json!({ "cleared": true }))?;
  } else {
    print_success("Shared state cleared");
  }
  Ok(())
}
