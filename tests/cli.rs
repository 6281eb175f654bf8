//! Runs the `resilience-sim` binary and checks what lands on each stream.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

fn command(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_resilience-sim"));
    cmd.args(args).env("RUST_LOG", "debug");
    for var in [
        "RESILIENCE_MAX_RETRIES",
        "RESILIENCE_INITIAL_DELAY_MS",
        "RESILIENCE_MAX_DELAY_MS",
        "RESILIENCE_FAILURE_THRESHOLD",
        "RESILIENCE_RESET_TIMEOUT_MS",
        "RESILIENCE_LOG_LEVEL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Runs with millisecond retry delays.
fn sim(args: &[&str]) -> Output {
    command(args)
        .env("RESILIENCE_INITIAL_DELAY_MS", "1")
        .env("RESILIENCE_MAX_DELAY_MS", "5")
        .output()
        .unwrap()
}

fn check_config(path: &Path) -> Output {
    command(&["check-config", path.to_str().unwrap()]).output().unwrap()
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout))
}

fn temp_config(name: &str, content: &str) -> PathBuf {
    let file = format!("resilience-cli-{}-{}.toml", name, std::process::id());
    let path = std::env::temp_dir().join(file);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_backoff_prints_only_json_on_stdout() {
    let first = sim(&["backoff", "--attempts", "4", "--seed", "9"]);
    assert!(first.status.success());

    // logging is on, but goes to stderr
    let stderr = String::from_utf8_lossy(&first.stderr);
    assert!(stderr.contains("Configuration loaded"), "stderr: {}", stderr);

    let schedule = stdout_json(&first);
    let steps = schedule.as_array().unwrap();
    assert_eq!(steps.len(), 4);
    for (step, base) in steps.iter().zip([1u64, 2, 4, 5]) {
        let delay = step["delay_ms"].as_u64().unwrap();
        assert!(delay >= base && (delay as f64) < base as f64 * 1.25, "{}", step);
    }

    let second = sim(&["backoff", "--attempts", "4", "--seed", "9"]);
    assert_eq!(stdout_json(&second), schedule);
}

#[test]
fn test_simulate_summary_accounts_for_every_call() {
    let output = sim(&[
        "simulate",
        "--calls",
        "30",
        "--failure-rate",
        "0.4",
        "--seed",
        "3",
        "--concurrency",
        "3",
        "--breaker",
        "orders",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let summary = stdout_json(&output);
    let total = summary["succeeded"].as_u64().unwrap()
        + summary["failed"].as_u64().unwrap()
        + summary["rejected"].as_u64().unwrap();
    assert_eq!(total, 30);
    assert_eq!(summary["calls"], 30);

    let breakers = summary["breakers"].as_array().unwrap();
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0]["name"], "orders");
}

#[test]
fn test_check_config_lists_every_error_once() {
    let path = temp_config(
        "invalid",
        "[retry]\ninitial_delay_ms = 0\n\n[circuit_breaker]\nfailure_threshold = 0\n\n\
         [observability]\nlog_level = \"loud\"\n",
    );

    let output = check_config(&path);
    std::fs::remove_file(&path).unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("3 validation error(s)"), "stderr: {}", stderr);
    assert!(stderr.contains("retry.initial_delay_ms must be greater than zero"));
    assert!(stderr.contains("circuit_breaker.failure_threshold must be greater than zero"));
    assert!(stderr.contains("unknown log level 'loud'"));
    assert!(!stderr.contains("Validation(["), "errors repeated as Debug: {}", stderr);
}

#[test]
fn test_check_config_prints_merged_settings() {
    let path = temp_config("valid", "[breakers.payments]\nfailure_threshold = 2\n");

    let output = command(&["check-config", path.to_str().unwrap()])
        .env("RESILIENCE_INITIAL_DELAY_MS", "1")
        .output()
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let settings = stdout_json(&output);
    assert_eq!(settings["breakers"]["payments"]["failure_threshold"], 2);
    // RESILIENCE_INITIAL_DELAY_MS from the environment
    assert_eq!(settings["retry"]["initial_delay_ms"], 1);
}
