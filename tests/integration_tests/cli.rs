use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::common::TestRepo;
use crate::common::mock_commands::{Route, mock_curl, requests};
use serde_json::{Value, json};
use tempfile::TempDir;

const CONFIG: &str = r#"
server-url = "https://bitbucket.example.com"
owner = "PROJ"
repository = "repo"
event-delay-secs = 0
"#;

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("source.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

fn headsync(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_headsync"));
    cmd.args(args).env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(mut cmd: Command, stdin: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn headsync");
    // The command may exit before reading stdin
    let _ = child.stdin.take().unwrap().write_all(stdin.as_bytes());
    child.wait_with_output().unwrap()
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn push_payload(changes: &str) -> String {
    format!(r#"{{"repository": {{"slug": "repo", "project": {{"key": "PROJ"}}}}, "changes": {changes}}}"#)
}

#[test]
fn test_hook_prints_head_updates() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let payload = push_payload(
        r#"[{"ref": {"id": "refs/heads/feature", "displayId": "feature", "type": "BRANCH"},
             "refId": "refs/heads/feature", "fromHash": "0000", "toHash": "abc", "type": "ADD"},
            {"ref": {"id": "refs/tags/v1", "displayId": "v1", "type": "TAG"},
             "refId": "refs/tags/v1", "fromHash": "def", "toHash": "0000", "type": "DELETE"}]"#,
    );

    let output = run_with_stdin(
        headsync(&[
            "hook",
            "--event",
            "repo:refs_changed",
            "--config",
            config.to_str().unwrap(),
        ]),
        &payload,
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let mut lines = json_lines(&output);
    lines.sort_by_key(|line| line["event"].to_string());
    assert_eq!(
        lines,
        vec![
            json!({
                "event": "created",
                "heads": {
                    "updates": [{
                        "head": {"kind": "branch", "name": "feature"},
                        "revision": {"kind": "commit", "hash": "abc"}
                    }],
                    "incomplete": false
                }
            }),
            json!({
                "event": "removed",
                "heads": {
                    "updates": [{
                        "head": {"kind": "tag", "name": "v1", "timestamp": 0},
                        "revision": null
                    }],
                    "incomplete": false
                }
            }),
        ]
    );
}

#[test]
fn test_hook_without_changes_requests_reindex() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let payload_path = dir.path().join("payload.json");
    std::fs::write(&payload_path, push_payload("[]")).unwrap();

    let output = headsync(&[
        "hook",
        "--event",
        "repo:refs_changed",
        "--payload",
        payload_path.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ])
    .output()
    .unwrap();
    assert!(output.status.success());
    assert_eq!(
        json_lines(&output),
        vec![json!({
            "reindex": {
                "server-url": "https://bitbucket.example.com",
                "owner": "PROJ",
                "repository": "repo"
            }
        })]
    );
}

#[test]
fn test_hook_drops_malformed_payload() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let output = run_with_stdin(
        headsync(&[
            "hook",
            "--event",
            "repo:refs_changed",
            "--config",
            config.to_str().unwrap(),
        ]),
        "{\"changes\": [",
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot read hook payload"));
}

#[test]
fn test_hook_rejects_pull_request_events() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let output = run_with_stdin(
        headsync(&["hook", "--event", "pr:opened", "--config", config.to_str().unwrap()]),
        "{}",
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported hook event pr:opened"), "{stderr}");
}

#[test]
fn test_missing_config_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    let output = run_with_stdin(
        headsync(&[
            "hook",
            "--event",
            "repo:refs_changed",
            "--config",
            missing.to_str().unwrap(),
        ]),
        "{}",
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config file not found"));
}

#[test]
fn test_resolve_branch_uses_http_link() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), CONFIG);
    let bin = TempDir::new().unwrap();
    mock_curl(
        bin.path(),
        &[Route::ok(
            "*/repos/repo",
            r#"{"slug": "repo", "project": {"key": "PROJ"}, "links": {"clone": [
                {"name": "ssh", "href": "ssh://git@bitbucket.example.com:7999/proj/repo.git"},
                {"name": "http", "href": "https://bitbucket.example.com/scm/proj/repo.git"}
            ]}}"#,
        )],
    );
    let path = format!(
        "{}:{}",
        bin.path().display(),
        std::env::var("PATH").unwrap_or_default()
    );

    let output = headsync(&[
        "resolve",
        "--config",
        config.to_str().unwrap(),
        "branch",
        "feature/x",
        "--hash",
        "abc",
    ])
    .env("PATH", path)
    .output()
    .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        plan,
        json!({
            "remote_name": "origin",
            "remote_url": "https://bitbucket.example.com/scm/proj/repo.git",
            "ref_specs": ["+refs/heads/feature/x:refs/remotes/origin/feature/x"],
            "additional_remotes": [],
            "extensions": [],
            "checkout_branch": "feature/x",
            "checkout_hash": "abc"
        })
    );
    assert_eq!(requests(bin.path()).len(), 1);
}

#[test]
fn test_fallback_fetch_command() {
    let upstream = TestRepo::new();
    let clone = TestRepo::clone_of(&upstream);
    let hash = upstream.commit_on("feature", "late commit");

    let branch_arg = format!("feature={hash}");
    let output = headsync(&[
        "fallback-fetch",
        "--repo",
        clone.root_path().to_str().unwrap(),
        "--url",
        upstream.root_path().to_str().unwrap(),
        &branch_arg,
    ])
    .output()
    .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "+refs/heads/feature:refs/remotes/primary/feature"
    );
    assert!(clone.has_commit(&hash));
}

#[test]
fn test_fallback_fetch_rejects_bad_branch_argument() {
    let output = headsync(&["fallback-fetch", "--url", "/tmp/x", "main"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("expected BRANCH=HASH"));
}
