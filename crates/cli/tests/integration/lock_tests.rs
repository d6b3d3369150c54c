use std::time::{Duration, Instant};

use predicates::prelude::*;
use serde_json::json;

use super::common::TestEnv;

#[test]
fn set_times_out_while_lock_is_held() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1}"#);
  std::fs::write(env.lock_path(), "held by someone else").unwrap();

  let start = Instant::now();
  env
    .sst_cmd()
    .args(["--timeout", "200ms", "set", "a", "2"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("timed out"));

  assert!(start.elapsed() >= Duration::from_millis(200));
  assert_eq!(env.read_value(), json!({ "a": 1 }));
  assert!(env.lock_path().exists());
}

#[test]
fn reads_do_not_wait_for_the_lock() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1}"#);
  std::fs::write(env.lock_path(), "held by someone else").unwrap();

  env
    .sst_cmd()
    .args(["--timeout", "5s", "get", "a"])
    .timeout(Duration::from_secs(2))
    .assert()
    .success()
    .stdout("1\n");
}

#[test]
fn status_shows_unknown_holder() {
  let env = TestEnv::new();
  std::fs::write(env.lock_path(), "12345").unwrap();

  env
    .sst_cmd()
    .arg("status")
    .assert()
    .success()
    .stderr(predicate::str::contains("Lock is held"))
    .stdout(predicate::str::contains("no readable metadata"));
}

#[test]
fn unlock_removes_orphaned_token() {
  let env = TestEnv::new();
  // PID that cannot belong to a live process.
  let metadata = json!({
    "version": 1,
    "pid": 2147483600u32,
    "acquired_at_unix": 0,
    "hostname": null,
    "command": "crashed-worker"
  });
  std::fs::write(env.lock_path(), metadata.to_string()).unwrap();

  env
    .sst_cmd()
    .args(["unlock", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed lock file"));

  assert!(!env.lock_path().exists());

  env.sst_cmd().args(["set", "after", "true"]).assert().success();
  assert_eq!(env.read_value(), json!({ "after": true }));
}

#[test]
fn unlock_without_force_is_refused_non_interactively() {
  let env = TestEnv::new();
  std::fs::write(env.lock_path(), "orphan").unwrap();

  env
    .sst_cmd()
    .arg("unlock")
    .assert()
    .failure()
    .stderr(predicate::str::contains("--force"));

  assert!(env.lock_path().exists());
}

#[test]
fn custom_lock_file_is_respected() {
  let env = TestEnv::new();
  let lock = env.temp.path().join("custom.lock");
  std::fs::write(&lock, "held").unwrap();

  env
    .sst_cmd()
    .arg("--lock-file")
    .arg(&lock)
    .args(["--timeout", "50ms", "set", "a", "1"])
    .assert()
    .failure();

  env.sst_cmd().args(["set", "a", "1"]).assert().success();
}

#[test]
fn status_with_locked_reads_does_not_wait_for_the_lock() {
  let env = TestEnv::new();
  env.write_value(r#"{"a": 1, "b": 2}"#);
  std::fs::write(env.lock_path(), "held by someone else").unwrap();

  let start = Instant::now();
  let output = env
    .sst_cmd()
    .args(["--locked-reads", "--timeout", "5s", "-o", "json", "status"])
    .timeout(Duration::from_secs(3))
    .output()
    .unwrap();
  assert!(output.status.success());
  assert!(start.elapsed() < Duration::from_secs(2));

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["locked"], json!(true));
  assert_eq!(report["keys"], json!(2));
}
