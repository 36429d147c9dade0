// Binary-level tests: dry-run output, saved plans and exit codes

use crate::common::write_file;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the binary with an isolated config directory.
fn bucketsync(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bucketsync"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn file_uri(dir: &Path) -> String {
    format!("file://{}", dir.display())
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_dry_run_prints_only_plan_lines() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(local.path(), "a.txt", b"alpha");
    write_file(local.path(), "dir/b.bin", b"bravo");

    let local_arg = local.path().display().to_string();
    let remote_arg = file_uri(remote.path());
    let output = bucketsync(home.path(), &["--dry-run", &local_arg, &remote_arg]);

    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["direction"], "upload");
    assert_eq!(lines[0]["destination"], remote_arg.as_str());
    assert_eq!(lines[1]["path"], "a.txt");
    assert_eq!(lines[2]["path"], "dir/b.bin");

    // Nothing was transferred.
    assert!(fs::read_dir(remote.path()).unwrap().next().is_none());
}

#[test]
fn test_plan_then_apply_transfers_files() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let plans = TempDir::new().unwrap();
    write_file(local.path(), "a.txt", b"alpha");
    write_file(local.path(), "dir/b.bin", b"bravo");

    let plan_path = plans.path().join("plan.jsonl");
    let plan_arg = plan_path.display().to_string();
    let local_arg = local.path().display().to_string();
    let remote_arg = file_uri(remote.path());

    let planned = bucketsync(home.path(), &["--plan", &plan_arg, &local_arg, &remote_arg]);
    assert!(planned.status.success(), "{}", stderr(&planned));
    assert!(plan_path.is_file());
    assert!(!remote.path().join("a.txt").exists());

    let applied = bucketsync(home.path(), &["--apply", &plan_arg]);
    assert_eq!(applied.status.code(), Some(0), "{}", stderr(&applied));
    assert_eq!(fs::read(remote.path().join("a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(remote.path().join("dir/b.bin")).unwrap(), b"bravo");
    assert!(stdout(&applied).contains("Sync complete"));
}

#[test]
fn test_apply_with_failed_operation_exits_one() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let plans = TempDir::new().unwrap();
    write_file(local.path(), "a.txt", b"alpha");
    write_file(local.path(), "b.txt", b"bravo");

    let plan_arg = plans.path().join("plan.jsonl").display().to_string();
    let local_arg = local.path().display().to_string();
    let remote_arg = file_uri(remote.path());
    let planned = bucketsync(home.path(), &["--plan", &plan_arg, &local_arg, &remote_arg]);
    assert!(planned.status.success(), "{}", stderr(&planned));

    // A directory now sits where a.txt must be written.
    fs::create_dir_all(remote.path().join("a.txt/occupied")).unwrap();

    let applied = bucketsync(home.path(), &["--apply", &plan_arg]);
    assert_eq!(applied.status.code(), Some(1), "{}", stderr(&applied));
    assert!(stdout(&applied).contains("a.txt"));
    assert_eq!(fs::read(remote.path().join("b.txt")).unwrap(), b"bravo");
}

#[test]
fn test_apply_rejects_direction_mismatch() {
    let home = TempDir::new().unwrap();
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let plans = TempDir::new().unwrap();

    let plan_path = plans.path().join("plan.jsonl");
    let plan_arg = plan_path.display().to_string();
    let local_arg = local.path().display().to_string();
    let remote_arg = file_uri(remote.path());
    let planned = bucketsync(home.path(), &["--plan", &plan_arg, &local_arg, &remote_arg]);
    assert!(planned.status.success(), "{}", stderr(&planned));

    let edited = fs::read_to_string(&plan_path)
        .unwrap()
        .replace(r#""direction":"upload""#, r#""direction":"download""#);
    fs::write(&plan_path, edited).unwrap();

    let applied = bucketsync(home.path(), &["--apply", &plan_arg]);
    assert_eq!(applied.status.code(), Some(2));
    assert!(stderr(&applied).contains("Plan header says 'download'"), "{}", stderr(&applied));
}

#[test]
fn test_apply_malformed_plan_is_fatal() {
    let home = TempDir::new().unwrap();
    let plans = TempDir::new().unwrap();
    let plan_path = plans.path().join("broken.jsonl");
    fs::write(&plan_path, "this is not a plan\n").unwrap();

    let applied = bucketsync(home.path(), &["--apply", &plan_path.display().to_string()]);
    assert_eq!(applied.status.code(), Some(2));
    assert!(stdout(&applied).is_empty());
}
