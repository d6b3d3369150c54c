use anyhow::Result;

use sharedstate_lib::{SharedMap, SharedStore};

use crate::output::{OutputFormat, format_value, print_info, print_json};

pub fn cmd_show(store: &SharedStore, output: OutputFormat) -> Result<()> {
  let value: SharedMap = store.load_or_default();

  if output.is_json() {
    return print_json(&value);
  }

  if value.is_empty() {
    print_info(&format!("No shared state in {}", store.value_path().display()));
    return Ok(());
  }

  for (key, entry) in &value {
    println!("{} = {}", key, format_value(entry));
  }
  Ok(())
}
