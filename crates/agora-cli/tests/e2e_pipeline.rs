//! E2E tests for `agora allocate` and `agora drain`.
//!
//! Each test runs the `agora` binary in an isolated temp directory with
//! config discovery pointed away from the real user config.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

const CREATED_AT: &str = "2024-03-01T12:00:00Z";

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn agora_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agora"));
    cmd.current_dir(dir);
    cmd.env("AGORA_LOG", "error");
    cmd.env("HOME", dir);
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env_remove("FORMAT");
    cmd
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(value).expect("serialize fixture"))
        .expect("write fixture");
    path
}

fn event(id: &str, depth: u32) -> Value {
    json!({
        "event_id": id,
        "event_type": "NewPostCreated",
        "idempotency_key": id,
        "chain_depth": depth,
        "community_id": "c-1",
        "post_id": "post-1",
        "author_agent_id": "agent-0",
        "created_at": CREATED_AT,
        "tags": ["rust"],
    })
}

fn pool() -> Value {
    Value::Array(
        (0..7)
            .map(|i| json!({ "agent_id": format!("agent-{i}"), "status": "active" }))
            .collect(),
    )
}

fn allocate_json(dir: &Path, event: &Value, extra: &[&str]) -> Value {
    let event_path = write_json(dir, "event.json", event);
    let pool_path = write_json(dir, "pool.json", &pool());
    let output = agora_cmd(dir)
        .arg("allocate")
        .arg("--event")
        .arg(&event_path)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--seed", "7", "--now", CREATED_AT, "--format", "json"])
        .args(extra)
        .output()
        .expect("allocate should not crash");
    assert!(
        output.status.success(),
        "allocate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("allocate --format json should emit JSON")
}

// ---------------------------------------------------------------------------
// allocate
// ---------------------------------------------------------------------------

#[test]
fn allocate_fills_post_quota_without_the_author() {
    let dir = TempDir::new().expect("tempdir");
    let result = allocate_json(dir.path(), &event("evt-1", 0), &[]);

    assert_eq!(result["quota_applied"], 5);
    assert_eq!(result["degradation_level"], "normal");
    let agents = result["agents"].as_array().expect("agents array");
    assert_eq!(agents.len(), 5);
    for (i, agent) in agents.iter().enumerate() {
        assert_ne!(agent["agent_id"], "agent-0");
        assert_eq!(agent["priority"], i + 1);
    }
}

#[test]
fn allocate_scales_quota_with_lag() {
    let dir = TempDir::new().expect("tempdir");
    let moderate = allocate_json(dir.path(), &event("evt-1", 0), &["--lag", "150"]);
    assert_eq!(moderate["degradation_level"], "moderate");
    assert_eq!(moderate["quota_applied"], 2);
    assert_eq!(moderate["agents"].as_array().map(Vec::len), Some(2));

    let critical = allocate_json(dir.path(), &event("evt-2", 0), &["--lag", "400"]);
    assert_eq!(critical["degradation_level"], "critical");
    assert_eq!(critical["quota_applied"], 0);
    assert_eq!(critical["skipped_reasons"]["_quota"], "effective quota is 0");
}

#[test]
fn allocate_rejects_chain_past_ceiling() {
    let dir = TempDir::new().expect("tempdir");
    let result = allocate_json(dir.path(), &event("evt-1", 6), &[]);
    assert_eq!(result["agents"].as_array().map(Vec::len), Some(0));
    let reason = result["skipped_reasons"]["_admission"]
        .as_str()
        .expect("admission reason");
    assert!(reason.contains("chain_depth 6 exceeds max 5"), "{reason}");
}

#[test]
fn allocate_text_output_lists_agents() {
    let dir = TempDir::new().expect("tempdir");
    let event_path = write_json(dir.path(), "event.json", &event("evt-1", 0));
    let pool_path = write_json(dir.path(), "pool.json", &pool());
    agora_cmd(dir.path())
        .arg("allocate")
        .arg("--event")
        .arg(&event_path)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--seed", "1", "--now", CREATED_AT, "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("allocation event=evt-1 quota=5 level=normal agents=5"))
        .stdout(predicate::str::contains("agent id=").count(5));
}

#[test]
fn allocate_uses_project_config() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(
        dir.path().join("agora.toml"),
        "global_max_agents_per_event = 2\n",
    )
    .expect("write config");
    let result = allocate_json(dir.path(), &event("evt-1", 0), &[]);
    assert_eq!(result["quota_applied"], 2);
}

#[test]
fn allocate_reports_config_parse_errors_with_code() {
    let dir = TempDir::new().expect("tempdir");
    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "global_max_agents_per_event = [oops").expect("write config");
    let event_path = write_json(dir.path(), "event.json", &event("evt-1", 0));
    let pool_path = write_json(dir.path(), "pool.json", &pool());

    let output = agora_cmd(dir.path())
        .arg("allocate")
        .arg("--event")
        .arg(&event_path)
        .arg("--pool")
        .arg(&pool_path)
        .arg("--config")
        .arg(&bad)
        .args(["--format", "json"])
        .output()
        .expect("allocate should not crash");
    assert_eq!(output.status.code(), Some(2));
    let err: Value = serde_json::from_slice(&output.stderr).expect("stderr should be JSON");
    assert_eq!(err["error"]["error_code"], "E1001");
}

#[test]
fn allocate_rejects_missing_pool_file() {
    let dir = TempDir::new().expect("tempdir");
    let event_path = write_json(dir.path(), "event.json", &event("evt-1", 0));
    agora_cmd(dir.path())
        .arg("allocate")
        .arg("--event")
        .arg(&event_path)
        .args(["--pool", "missing.json", "--format", "text"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing.json"));
}

// ---------------------------------------------------------------------------
// drain
// ---------------------------------------------------------------------------

#[test]
fn drain_rejects_redelivered_events() {
    let dir = TempDir::new().expect("tempdir");
    let line = serde_json::to_string(&event("evt-1", 0)).expect("serialize");
    let log = dir.path().join("events.jsonl");
    std::fs::write(&log, format!("{line}\n\n{line}\n")).expect("write log");
    let pool_path = write_json(dir.path(), "pool.json", &pool());

    let output = agora_cmd(dir.path())
        .arg("drain")
        .arg("--events")
        .arg(&log)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--seed", "3", "--now", CREATED_AT, "--format", "json"])
        .output()
        .expect("drain should not crash");
    assert!(output.status.success());
    let out: Value = serde_json::from_slice(&output.stdout).expect("drain JSON");
    assert_eq!(out["enqueued"], 2);
    assert_eq!(out["remaining"], 0);
    assert_eq!(out["stats"]["processed"], 2);
    assert_eq!(out["stats"]["rejected_admission"], 1);
    assert_eq!(out["results"][1]["skipped_reasons"]["_admission"], "duplicate idempotency_key");
}

#[test]
fn drain_batch_leaves_the_rest_queued() {
    let dir = TempDir::new().expect("tempdir");
    let lines: Vec<String> = (1..=4)
        .map(|i| serde_json::to_string(&event(&format!("evt-{i}"), 0)).expect("serialize"))
        .collect();
    let log = dir.path().join("events.jsonl");
    std::fs::write(&log, lines.join("\n")).expect("write log");
    let pool_path = write_json(dir.path(), "pool.json", &pool());

    agora_cmd(dir.path())
        .arg("drain")
        .arg("--events")
        .arg(&log)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--batch", "3", "--now", CREATED_AT, "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("processed=3"))
        .stdout(predicate::str::contains("remaining=1"));
}

#[test]
fn drain_bridges_domain_events() {
    let dir = TempDir::new().expect("tempdir");
    let post = json!({
        "id": "dom-1",
        "event_type": "POST_CREATED",
        "payload": {
            "community_id": "c-1",
            "post_id": "post-9",
            "author_agent_id": "agent-0",
        },
        "created_at": CREATED_AT,
    });
    let join = json!({
        "id": "dom-2",
        "event_type": "USER_JOINED",
        "payload": {},
        "created_at": CREATED_AT,
    });
    let log = dir.path().join("domain.jsonl");
    std::fs::write(&log, format!("{post}\n{join}\n")).expect("write log");
    let pool_path = write_json(dir.path(), "pool.json", &pool());

    let output = agora_cmd(dir.path())
        .arg("drain")
        .arg("--events")
        .arg(&log)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--domain", "--now", CREATED_AT, "--format", "json"])
        .output()
        .expect("drain should not crash");
    assert!(output.status.success());
    let out: Value = serde_json::from_slice(&output.stdout).expect("drain JSON");
    assert_eq!(out["enqueued"], 1);
    assert_eq!(out["not_bridged"], 1);
    assert_eq!(out["results"][0]["event_id"], "dom-1");
    assert_eq!(out["results"][0]["quota_applied"], 5);
}

#[test]
fn drain_rejects_incomplete_events_and_keeps_going() {
    let dir = TempDir::new().expect("tempdir");
    let mut no_community = event("evt-1", 0);
    no_community
        .as_object_mut()
        .expect("event object")
        .remove("community_id");
    let mut poll = event("evt-2", 0);
    poll["event_type"] = json!("PollClosed");
    let lines: Vec<String> = [no_community, poll, event("evt-3", 0)]
        .iter()
        .map(|value| serde_json::to_string(value).expect("serialize"))
        .collect();
    let log = dir.path().join("events.jsonl");
    std::fs::write(&log, lines.join("\n")).expect("write log");
    let pool_path = write_json(dir.path(), "pool.json", &pool());

    let output = agora_cmd(dir.path())
        .arg("drain")
        .arg("--events")
        .arg(&log)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--seed", "3", "--now", CREATED_AT, "--format", "json"])
        .output()
        .expect("drain should not crash");
    assert!(output.status.success());
    let out: Value = serde_json::from_slice(&output.stdout).expect("drain JSON");
    assert_eq!(out["enqueued"], 3);
    assert_eq!(out["stats"]["processed"], 3);
    assert_eq!(out["stats"]["rejected_admission"], 2);
    assert_eq!(out["results"][0]["skipped_reasons"]["_admission"], "missing community_id");
    assert_eq!(
        out["results"][1]["skipped_reasons"]["_admission"],
        "unknown event_type: PollClosed"
    );
    assert_eq!(out["results"][2]["event_id"], "evt-3");
    assert_eq!(out["results"][2]["quota_applied"], 5);
}

#[test]
fn drain_reports_the_bad_line() {
    let dir = TempDir::new().expect("tempdir");
    let line = serde_json::to_string(&event("evt-1", 0)).expect("serialize");
    let log = dir.path().join("events.jsonl");
    std::fs::write(&log, format!("{line}\n{{not json\n")).expect("write log");
    let pool_path = write_json(dir.path(), "pool.json", &pool());

    agora_cmd(dir.path())
        .arg("drain")
        .arg("--events")
        .arg(&log)
        .arg("--pool")
        .arg(&pool_path)
        .args(["--format", "text"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 2"));
}
