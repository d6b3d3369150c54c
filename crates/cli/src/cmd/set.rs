//! `sst set`: write one top-level key inside a single lock hold.

use anyhow::{Context, Result};
use serde_json::Value;

use sharedstate_lib::{SharedMap, SharedStore};

use crate::output::{OutputFormat, print_json, print_success};

pub fn cmd_set(store: &SharedStore, key: &str, raw: &str, output: OutputFormat) -> Result<()> {
  let value = parse_value(raw);

  store
    .update(SharedMap::new(), |map| {
      map.insert(key.to_string(), value.clone());
    })
    .with_context(|| format!("Failed to update {}", store.value_path().display()))?;

  if output.is_json() {
    print_json(&serde_json::json!({ "key": key, "value": value }))?;
  } else {
    print_success(&format!("Set {}", key));
  }
  Ok(())
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_json_values() {
    assert_eq!(parse_value("42"), json!(42));
    assert_eq!(parse_value("true"), json!(true));
    assert_eq!(parse_value(r#"{"a":[1,2]}"#), json!({ "a": [1, 2] }));
    assert_eq!(parse_value(r#""quoted""#), json!("quoted"));
  }

  #[test]
  fn falls_back_to_plain_string() {
    assert_eq!(parse_value("hello world"), json!("hello world"));
    assert_eq!(parse_value("{broken"), json!("{broken"));
  }
}
