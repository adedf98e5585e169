//! E2E tests for `agora config`, `agora sim` and `agora completions`.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn agora_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("agora"));
    cmd.current_dir(dir);
    cmd.env("AGORA_LOG", "error");
    cmd.env("HOME", dir);
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env_remove("FORMAT");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn config_show_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let out = stdout_json(agora_cmd(dir.path()).args(["config", "show", "--json"]));
    assert_eq!(out["source"]["kind"], "defaults");
    assert_eq!(out["config"]["global_max_agents_per_event"], 10);
    assert_eq!(out["config"]["default_thread_max_agents"], 20);
    assert_eq!(out["config"]["degradation"]["critical_factor"], 0.1);
}

#[test]
fn config_init_then_show_reads_project_file() {
    let dir = TempDir::new().expect("tempdir");
    agora_cmd(dir.path())
        .args(["config", "init", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config written"));
    assert!(dir.path().join("agora.toml").exists());

    let out = stdout_json(agora_cmd(dir.path()).args(["config", "show", "--format", "json"]));
    assert_eq!(out["source"]["kind"], "project");
    assert_eq!(out["config"]["max_chain_depth"], 5);

    agora_cmd(dir.path())
        .args(["config", "init"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn config_show_text_is_toml() {
    let dir = TempDir::new().expect("tempdir");
    agora_cmd(dir.path())
        .args(["config", "show", "--defaults", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# source: built-in defaults"))
        .stdout(predicate::str::contains("cooldown_seconds = 60"));
}

#[test]
fn config_validate_flags_inverted_thresholds() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("inverted.toml");
    std::fs::write(
        &path,
        "[degradation]\nmoderate_threshold_seconds = 400.0\ncritical_threshold_seconds = 300.0\n",
    )
    .expect("write config");

    agora_cmd(dir.path())
        .args(["config", "validate"])
        .arg(&path)
        .args(["--format", "text"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("E1002"));
}

#[test]
fn config_validate_accepts_partial_file() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "cooldown_seconds = 10\n").expect("write config");

    let out = stdout_json(
        agora_cmd(dir.path())
            .args(["config", "validate", "--format", "json"])
            .arg(&path),
    );
    assert_eq!(out["valid"], true);
}

// ---------------------------------------------------------------------------
// sim
// ---------------------------------------------------------------------------

#[test]
fn sim_run_small_campaign_passes() {
    let dir = TempDir::new().expect("tempdir");
    let out = stdout_json(agora_cmd(dir.path()).args([
        "sim", "run", "--seeds", "3", "--rounds", "10", "--format", "json",
    ]));
    assert_eq!(out["seeds_run"], 3);
    assert_eq!(out["all_passed"], true);
    assert_eq!(out["first_failure"], Value::Null);
}

#[test]
fn sim_replay_prints_events() {
    let dir = TempDir::new().expect("tempdir");
    agora_cmd(dir.path())
        .args(["sim", "replay", "--seed", "4", "--rounds", "8", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("replay seed=4"))
        .stdout(predicate::str::contains("oracle_passed=true"))
        .stdout(predicate::str::contains("event round=0"));
}

#[test]
fn sim_replay_is_deterministic() {
    let dir = TempDir::new().expect("tempdir");
    let run = || {
        stdout_json(agora_cmd(dir.path()).args([
            "sim", "replay", "--seed", "9", "--rounds", "12", "--format", "json",
        ]))
    };
    assert_eq!(run(), run());
}

#[test]
fn sim_run_rejects_empty_seed_range() {
    let dir = TempDir::new().expect("tempdir");
    agora_cmd(dir.path())
        .args(["sim", "run", "--seeds", "0", "--format", "text"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("seed_range"));
}

// ---------------------------------------------------------------------------
// completions
// ---------------------------------------------------------------------------

#[test]
fn completions_bash_mentions_subcommands() {
    let dir = TempDir::new().expect("tempdir");
    agora_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("agora"))
        .stdout(predicate::str::contains("allocate"));
}

#[test]
fn completions_can_write_to_file() {
    let dir = TempDir::new().expect("tempdir");
    agora_cmd(dir.path())
        .args(["completions", "zsh", "--out", "_agora"])
        .assert()
        .success();
    let script = std::fs::read_to_string(dir.path().join("_agora")).expect("script written");
    assert!(script.contains("drain"));
}
