use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const POLICY: &str = r#"
name = "Filesystem safety"

[[rules]]
name = "no-delete-after-read"
action = "block"
message = "Deleting files after reading them is not allowed"

[rules.when]
all = [
  { test = { value = "call_name", op = "equals", operand = "delete_file" } },
  { exists = { select = "^read_file$" } },
]
"#;

fn tramlines(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tramlines"))
        .args(args)
        .output()
        .unwrap()
}

fn write_policy(dir: &Path) -> String {
    let path = dir.join("fs.toml");
    std::fs::write(&path, POLICY).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_tramlines_version() {
    let output = tramlines(&["--version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("0.1.0"));
}

#[test]
fn test_tramlines_help() {
    let output = tramlines(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("simulate"));
    assert!(stdout.contains("guard"));
}

#[test]
fn test_init_then_refuse_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tramlines.toml");
    let path = path.to_string_lossy();

    assert!(tramlines(&["init", &path]).status.success());
    assert!(!tramlines(&["init", &path]).status.success());
}

#[test]
fn test_validate_policy_file() {
    let dir = tempfile::tempdir().unwrap();
    let policy = write_policy(dir.path());

    let output = tramlines(&["validate", &policy]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no-delete-after-read"));

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "name = \"x\"\n[[rules]]\nname = \"r\"\n").unwrap();
    assert!(!tramlines(&["validate", &broken.to_string_lossy()]).status.success());
}

#[test]
fn test_simulate_recorded_calls() {
    let dir = tempfile::tempdir().unwrap();
    let policy = write_policy(dir.path());
    let calls = dir.path().join("calls.json");
    std::fs::write(
        &calls,
        r#"[{"name": "read_file", "arguments": {"path": "a"}}, {"name": "delete_file", "arguments": {"path": "a"}}]"#,
    )
    .unwrap();
    let calls = calls.to_string_lossy();

    let output = tramlines(&["simulate", "--calls", &calls, "--policy", &policy]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let decisions: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0]["action"], "ALLOW");
    assert_eq!(decisions[1]["action"], "BLOCK");
    assert_eq!(decisions[1]["violated_rule"], "no-delete-after-read");

    let output = tramlines(&[
        "simulate",
        "--calls",
        &calls,
        "--policy",
        &policy,
        "--fail-on-block",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_guard_reads_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let policy = write_policy(dir.path());

    let mut child = Command::new(env!("CARGO_BIN_EXE_tramlines"))
        .args(["guard", "--policy", policy.as_str()])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"{{"session_id": "s1", "name": "read_file", "arguments": {{"path": "a"}}}}"#).unwrap();
        writeln!(stdin, r#"{{"session_id": "s2", "name": "delete_file"}}"#).unwrap();
        writeln!(stdin, r#"{{"session_id": "s1", "name": "delete_file"}}"#).unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let actions: Vec<String> = stdout
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["action"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(actions, ["ALLOW", "ALLOW", "BLOCK"]);
}
