//! CLI tests for Leanserve
//!
//! Runs the built binary with a clean environment and covers:
//! - Help and version output
//! - `plan` output in JSON and text form
//! - Exit codes for configuration and startup failures

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

/// A command with an empty environment, run from an empty directory so no
/// stray config file is picked up.
fn leanserve_cmd() -> (Command, TempDir) {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("leanserve").unwrap();
    cmd.env_clear().current_dir(dir.path());
    (cmd, dir)
}

fn plan_json(envs: &[(&str, &str)], args: &[&str]) -> Value {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["plan", "--json"]).args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

fn group<'a>(plan: &'a Value, name: &str) -> &'a Value {
    plan["groups"]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g["group"] == name)
        .unwrap()
}

// ============================================================================
// Basic Invocation
// ============================================================================

#[test]
fn test_help() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("plan"));
}

#[test]
fn test_version() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_worker_slot_is_hidden_from_help() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--single-process"))
        .stdout(predicate::str::contains("worker-slot").not());
}

// ============================================================================
// Plan
// ============================================================================

#[test]
fn test_plan_defaults() {
    let plan = plan_json(&[], &[]);

    assert_eq!(group(&plan, "core")["mounted"], true);
    assert_eq!(group(&plan, "retrieval")["mounted"], true);
    assert_eq!(group(&plan, "debug")["mounted"], false);
    assert_eq!(plan["threads"], 1);
    assert!(plan["workers"].as_u64().unwrap() >= 2);
    assert_eq!(plan["flags"]["LAZY_LOAD_MODELS"], true);
}

#[test]
fn test_plan_reflects_environment_flags() {
    let plan = plan_json(
        &[
            ("BYPASS_EMBEDDING_AND_RETRIEVAL", "true"),
            ("ENABLE_DEBUG_ENDPOINTS", "true"),
        ],
        &[],
    );

    let retrieval = group(&plan, "retrieval");
    assert_eq!(retrieval["mounted"], false);
    assert_eq!(retrieval["blocked_by"][0], "retrieval_enabled");
    assert_eq!(group(&plan, "debug")["mounted"], true);

    let components = plan["components"].as_array().unwrap();
    assert!(!components.iter().any(|c| c == "vector_store"));
}

#[test]
fn test_plan_worker_override() {
    let plan = plan_json(&[("WEB_CONCURRENCY", "3")], &[]);
    assert_eq!(plan["workers"], 3);

    // The command line wins over the environment.
    let plan = plan_json(&[("WEB_CONCURRENCY", "3")], &["--workers", "5"]);
    assert_eq!(plan["workers"], 5);
}

#[test]
fn test_plan_text_output() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["--no-color", "plan"])
        .env("ENABLE_IMAGE_GENERATION", "false")
        .assert()
        .success()
        .stdout(predicate::str::contains("Route groups"))
        .stdout(predicate::str::contains("ENABLE_IMAGE_GENERATION"))
        .stdout(predicate::str::is_match(r"images\s+skipped").unwrap());
}

#[test]
fn test_plan_shows_recycle_window() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["--no-color", "plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("950..=1050 requests"));

    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["--no-color", "plan"])
        .env("MAX_REQUESTS", "0")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"recycle after\s+disabled").unwrap());
}

#[test]
fn test_plan_reads_config_file() {
    let (mut cmd, dir) = leanserve_cmd();
    let path = dir.path().join("leanserve.toml");
    std::fs::write(&path, "[server]\nworkers = 4\n").unwrap();

    let output = cmd
        .args(["plan", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let plan: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(plan["workers"], 4);
}

// ============================================================================
// Failure Exit Codes
// ============================================================================

#[test]
fn test_zero_workers_is_a_config_error() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["plan"])
        .env("WEB_CONCURRENCY", "0")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("WEB_CONCURRENCY"));
}

#[test]
fn test_unparsable_flag_is_a_config_error() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["plan"])
        .env("MAX_REQUESTS", "many")
        .assert()
        .code(78)
        .stderr(predicate::str::contains("MAX_REQUESTS"));
}

#[test]
fn test_unknown_vector_backend_is_a_config_error() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["plan"])
        .env("VECTOR_DB", "faiss")
        .assert()
        .code(78);
}

#[test]
fn test_eager_startup_failure_exits_with_startup_code() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["serve", "--single-process", "--host", "127.0.0.1", "--port", "0"])
        .env("VECTOR_DB", "disabled")
        .env("LAZY_LOAD_MODELS", "false")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(78)
        .stderr(predicate::str::contains("failed to start"));
}

#[cfg(unix)]
#[test]
fn test_pool_exits_when_its_only_worker_never_serves() {
    let (mut cmd, _dir) = leanserve_cmd();
    cmd.args(["serve", "--workers", "1", "--host", "127.0.0.1", "--port", "0"])
        .env("VECTOR_DB", "disabled")
        .env("LAZY_LOAD_MODELS", "false")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .code(78)
        .stderr(predicate::str::contains("worker slots failed to start"));
}
