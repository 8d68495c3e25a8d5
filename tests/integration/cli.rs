//! End-to-end runs of the `taskpool` binary.

use std::path::Path;
use std::process::Command;

fn taskpool() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskpool"));
    let no_config = Path::new(env!("CARGO_TARGET_TMPDIR")).join("no-config");
    cmd.env("XDG_CONFIG_HOME", no_config)
        .env_remove("TASKPOOL_MAX_WORKERS")
        .env_remove("TASKPOOL_IDLE_TIMEOUT_SECS")
        .env_remove("TASKPOOL_MAX_FINISHED");
    cmd
}

#[test]
fn test_version() {
    let output = taskpool().arg("version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("taskpool "));
}

#[test]
fn test_demo_prints_task_list() {
    let output = taskpool()
        .args(["demo", "--tasks", "6", "--fail-every", "3", "--max-millis", "20"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let list: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = list.as_array().unwrap();
    assert_eq!(entries.len(), 6);
    assert!(entries.iter().all(|entry| entry["state"] == "finished"));
    let failed = entries
        .iter()
        .filter(|entry| entry["success"] == false)
        .count();
    assert_eq!(failed, 2);
}

#[test]
fn test_config_file_and_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("taskpool.toml");
    std::fs::write(&path, "[tasks]\nmax_finished = 3\n").unwrap();

    let output = taskpool()
        .args(["--config", path.to_str().unwrap(), "config"])
        .env("TASKPOOL_MAX_WORKERS", "2")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("max_finished = 3"));
    assert!(stdout.contains("max_workers = 2"));
}

#[test]
fn test_demo_respects_finished_capacity() {
    let output = taskpool()
        .args(["demo", "--tasks", "8", "--max-millis", "5"])
        .env("TASKPOOL_MAX_FINISHED", "4")
        .output()
        .unwrap();
    assert!(output.status.success());
    let list: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(list.as_array().unwrap().len(), 4);
}

#[test]
fn test_invalid_override_fails() {
    let output = taskpool()
        .args(["config"])
        .env("TASKPOOL_MAX_WORKERS", "many")
        .output()
        .unwrap();
    assert!(!output.status.success());
}
