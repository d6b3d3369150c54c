use anyhow::{Context, Result};

use sharedstate_lib::{SharedMap, SharedStore};

use crate::output::{OutputFormat, print_info, print_json, print_success};

pub fn cmd_remove(store: &SharedStore, key: &str, output: OutputFormat) -> Result<()> {
  let mut removed = None;

  store
    .update(SharedMap::new(), |map| {
      removed = map.remove(key);
    })
    .with_context(|| format!("Failed to update {}", store.value_path().display()))?;

  if output.is_json() {
    print_json(&serde_json::json!({ "key": key, "removed": removed.is_some() }))?;
  } else if removed.is_some() {
    print_success(&format!("Removed {}", key));
  } else {
    print_info(&format!("Key not present: {}", key));
  }
  Ok(())
}
