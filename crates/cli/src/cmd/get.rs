use anyhow::{Result, bail};

use sharedstate_lib::{SharedMap, SharedStore};

use crate::output::{OutputFormat, format_value, print_json};

pub fn cmd_get(store: &SharedStore, key: &str, output: OutputFormat) -> Result<()> {
  let value: SharedMap = store.load_or_default();

  let Some(entry) = value.get(key) else {
    bail!("Key not found: {}", key);
  };

  if output.is_json() {
    print_json(entry)?;
  } else {
    println!("{}", format_value(entry));
  }
  Ok(())
}
