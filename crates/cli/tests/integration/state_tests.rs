use predicates::prelude::*;
use serde_json::json;

use super::common::TestEnv;

#[test]
fn set_then_get_round_trips() {
  let env = TestEnv::new();

  env
    .sst_cmd()
    .args(["set", "processed", "42"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Set processed"));

  env
    .sst_cmd()
    .args(["get", "processed"])
    .assert()
    .success()
    .stdout("42\n");

  assert_eq!(env.read_value(), json!({ "processed": 42 }));
  assert!(!env.lock_path().exists());
}

#[test]
fn set_keeps_other_keys() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1}"#);

  env.sst_cmd().args(["set", "b", r#"{"nested": [1, 2]}"#]).assert().success();
  env.sst_cmd().args(["set", "c", "plain text"]).assert().success();

  assert_eq!(
    env.read_value(),
    json!({ "a": 1, "b": { "nested": [1, 2] }, "c": "plain text" })
  );
}

#[test]
fn show_json_output_is_valid() {
  let env = TestEnv::new();
  env.write_value(r#"{"tv": {"count": 3}}"#);

  let output = env.sst_cmd().args(["-o", "json", "show"]).output().unwrap();
  assert!(output.status.success());

  let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(shown, json!({ "tv": { "count": 3 } }));
}

#[test]
fn show_corrupt_value_falls_back_to_empty() {
  let env = TestEnv::new();
  env.write_value("\u{0}\u{1}not json at all");

  env
    .sst_cmd()
    .arg("show")
    .assert()
    .success()
    .stdout(predicate::str::contains("No shared state"));
}

#[test]
fn remove_deletes_key() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1, "b": 2}"#);

  env
    .sst_cmd()
    .args(["remove", "a"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed a"));

  env
    .sst_cmd()
    .args(["remove", "a"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Key not present"));

  assert_eq!(env.read_value(), json!({ "b": 2 }));
}

#[test]
fn clear_with_force_empties_value() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1}"#);

  env
    .sst_cmd()
    .args(["clear", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("cleared"));

  assert_eq!(env.read_value(), json!({}));
}

#[test]
fn status_reports_value_size_and_keys() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1, "b": 2, "c": 3}"#);

  let output = env.sst_cmd().args(["-o", "json", "status"]).output().unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["value_exists"], json!(true));
  assert_eq!(report["keys"], json!(3));
  assert_eq!(report["locked"], json!(false));
  assert_eq!(report["strategy"], json!("token"));
}

#[test]
fn show_prints_strings_the_way_get_does() {
  let env = TestEnv::new();
  env.write_value(r#"{"name": "tv shows", "count": 3}"#);

  env
    .sst_cmd()
    .arg("show")
    .assert()
    .success()
    .stdout(predicate::str::contains("name = tv shows\n"))
    .stdout(predicate::str::contains("count = 3\n"))
    .stdout(predicate::str::contains("\"tv shows\"").not());

  env
    .sst_cmd()
    .args(["get", "name"])
    .assert()
    .success()
    .stdout("tv shows\n");
}

#[test]
fn keep_backup_recovers_from_corrupt_value() {
  let env = TestEnv::new();
  let backup = env.temp.path().join("shared_stats.json.bak");

  env.sst_cmd().args(["--keep-backup", "set", "a", "1"]).assert().success();
  assert!(!backup.exists());
  env.sst_cmd().args(["--keep-backup", "set", "a", "2"]).assert().success();
  assert!(backup.exists());

  env.write_value("{ torn");
  env
    .sst_cmd()
    .args(["--keep-backup", "get", "a"])
    .assert()
    .success()
    .stdout("1\n");

  env
    .sst_cmd()
    .args(["get", "a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Key not found"));
}

#[test]
fn prune_keeps_recent_backup() {
  let env = TestEnv::new();
  let backup = env.temp.path().join("shared_stats.json.bak");
  env.sst_cmd().args(["--keep-backup", "set", "a", "1"]).assert().success();
  env.sst_cmd().args(["--keep-backup", "set", "a", "2"]).assert().success();

  env
    .sst_cmd()
    .arg("prune")
    .assert()
    .success()
    .stdout(predicate::str::contains("No backup older than 7days"));

  assert!(backup.exists());
}
