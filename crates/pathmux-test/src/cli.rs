//! CLI regression tests for the `pathmux` binary.
//!
//! These invoke the binary as a subprocess to catch regressions in flag
//! names, exit codes, and output formats.
//!
//! Run with: `cargo test -p pathmux-test`
//! Requires the `pathmux` binary to be built first (`cargo build -p pathmux`).

use assert_cmd::Command;
use predicates::str::contains;

use crate::server::fixture;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns an assert_cmd Command wrapping the `pathmux` binary.
fn pathmux() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("pathmux")
        .expect("pathmux binary not found; run `cargo build -p pathmux` first")
}

fn stdout_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout is JSON")
}

// ---------------------------------------------------------------------------
// pathmux validate
// ---------------------------------------------------------------------------

#[test]
fn validate_valid_table_exits_zero() {
    pathmux()
        .args(["validate", "--routes"])
        .arg(fixture("minimal.yaml"))
        .assert()
        .success()
        .stdout(contains("ok (3 route(s), 4 pattern(s))"))
        .stdout(contains("/users/{id:[0-9]+}"));
}

#[test]
fn validate_invalid_pattern_exits_one() {
    pathmux()
        .args(["validate", "--routes"])
        .arg(fixture("invalid-pattern.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("unclosed variable"));
}

#[test]
fn validate_invalid_regex_exits_one() {
    pathmux()
        .args(["validate", "--routes"])
        .arg(fixture("invalid-regex.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("route 0"));
}

#[test]
fn validate_conflict_exits_one() {
    pathmux()
        .args(["validate", "--routes"])
        .arg(fixture("invalid-conflict.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("already registered: GET /users/{id}"));
}

#[test]
fn validate_parse_error_exits_one() {
    pathmux()
        .args(["validate", "--routes"])
        .arg(fixture("invalid-parse-error.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid route table"));
}

#[test]
fn validate_missing_file_exits_one() {
    pathmux()
        .args(["validate", "--routes", "this-file-does-not-exist.yaml"])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("failed to read"));
}

#[test]
fn validate_json_output() {
    let output = pathmux()
        .args(["validate", "--format", "json", "--routes"])
        .arg(fixture("minimal.yaml"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let result = stdout_json(&output);
    assert_eq!(result["valid"], true);
    assert_eq!(result["routes"], 3);
    assert!(result.get("error").is_none());
}

#[test]
fn validate_json_output_on_error() {
    let output = pathmux()
        .args(["validate", "--format", "json", "--routes"])
        .arg(fixture("invalid-conflict.yaml"))
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let result = stdout_json(&output);
    assert_eq!(result["valid"], false);
    assert!(result["error"].as_str().unwrap().contains("already registered"));
}

// ---------------------------------------------------------------------------
// pathmux match
// ---------------------------------------------------------------------------

#[test]
fn match_found_prints_pattern_and_params() {
    let output = pathmux()
        .args(["match", "--routes"])
        .arg(fixture("scenarios.yaml"))
        .arg("/v1/core/v1/configmap/abc")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let result = stdout_json(&output);
    assert_eq!(result["outcome"], "found");
    assert_eq!(result["pattern"], "/v1/{group}/{version}/configmap/{name}");
    assert_eq!(result["params"]["group"], "core");
    assert_eq!(result["params"]["name"], "abc");
}

#[test]
fn match_not_found_exits_one() {
    pathmux()
        .args(["match", "--routes"])
        .arg(fixture("scenarios.yaml"))
        .arg("/dogs/HI")
        .assert()
        .failure()
        .code(1)
        .stdout(contains(r#""outcome":"not_found""#));
}

#[test]
fn match_method_not_allowed_lists_methods() {
    let output = pathmux()
        .args(["match", "--method", "DELETE", "--routes"])
        .arg(fixture("minimal.yaml"))
        .arg("/users")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let result = stdout_json(&output);
    assert_eq!(result["outcome"], "method_not_allowed");
    assert_eq!(result["allowed"], serde_json::json!(["POST"]));
}

#[test]
fn match_options_reports_automatic_answer() {
    let output = pathmux()
        .args(["match", "--method", "OPTIONS", "--routes"])
        .arg(fixture("minimal.yaml"))
        .arg("/users")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let result = stdout_json(&output);
    assert_eq!(result["outcome"], "options");
    assert_eq!(result["pattern"], "/users");
    assert_eq!(result["allowed"], serde_json::json!(["POST"]));
}

#[test]
fn match_greedy_suffix() {
    pathmux()
        .args(["match", "--routes"])
        .arg(fixture("scenarios.yaml"))
        .arg("/ops/dog/wang/1:action")
        .assert()
        .success()
        .stdout(contains(r#""pattern":"/ops/{name}/{path}*:action""#));
}

// ---------------------------------------------------------------------------
// pathmux serve
// ---------------------------------------------------------------------------

#[test]
fn serve_invalid_table_exits_one() {
    pathmux()
        .args(["serve", "--listen", "127.0.0.1:0", "--routes"])
        .arg(fixture("invalid-pattern.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("unclosed variable"));
}

#[test]
fn serve_invalid_log_format_exits_one() {
    pathmux()
        .args(["serve", "--log-format", "xml", "--routes"])
        .arg(fixture("minimal.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid log format"));
}

#[test]
fn serve_invalid_listen_exits_one() {
    pathmux()
        .args(["serve", "--listen", "not-an-address", "--routes"])
        .arg(fixture("minimal.yaml"))
        .assert()
        .failure()
        .code(1)
        .stderr(contains("invalid listen address"));
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

#[test]
fn help_lists_subcommands() {
    pathmux()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("validate"))
        .stdout(contains("match"))
        .stdout(contains("serve"));
}

#[test]
fn unknown_subcommand_exits_nonzero() {
    pathmux().arg("frobnicate").assert().failure();
}
