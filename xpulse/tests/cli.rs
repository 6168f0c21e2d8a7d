//! Command-line behavior that needs no network access
//!
//! Each test runs the binary in an empty temp directory with the xpulse
//! environment scrubbed, so no `.env` file or user config leaks in.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const XPULSE_VARS: [&str; 9] = [
    "X_ACCESS_TOKEN",
    "X_BEARER_TOKEN",
    "X_API_BASE_URL",
    "XPULSE_SCHEDULER_URL",
    "XPULSE_SCHEDULER_API_KEY",
    "XPULSE_MAX_RETRIES",
    "XPULSE_BASE_DELAY_MS",
    "XPULSE_LOG_FORMAT",
    "XPULSE_LOG_LEVEL",
];

/// Unreachable address; tests that get this far would fail to connect
const DEAD_API: &str = "http://127.0.0.1:9/2";

fn xpulse(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("xpulse").unwrap();
    cmd.current_dir(dir.path())
        .env("XPULSE_CONFIG", dir.path().join("missing.toml"))
        .env_remove("RUST_LOG");
    for var in XPULSE_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let output = xpulse(&dir).arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    for command in [
        "profile",
        "timeline",
        "search",
        "thread",
        "metrics",
        "pulse",
        "schedule",
        "scheduled",
        "cancel-scheduled",
        "selftest",
    ] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
    assert!(stdout.contains("EXIT CODES"));
    assert!(stdout.contains("X_ACCESS_TOKEN"));
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_subcommand_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir).assert().failure().code(2);
}

#[test]
fn test_thread_requires_texts() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .arg("thread")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_missing_credentials_exit_code() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .arg("profile")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::starts_with("Error: Configuration error"))
        .stderr(predicate::str::contains("X_ACCESS_TOKEN"))
        .stderr(predicate::str::contains("X_BEARER_TOKEN"));
}

#[test]
fn test_credentials_from_dotenv_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "X_ACCESS_TOKEN=from-dotenv\n").unwrap();

    // Credentials are found, so the failure is validation, not configuration
    xpulse(&dir)
        .env("X_API_BASE_URL", DEAD_API)
        .args(["post", ""])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_empty_post_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .env("X_ACCESS_TOKEN", "token")
        .env("X_API_BASE_URL", DEAD_API)
        .args(["post", "   "])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Post text cannot be empty"));
}

#[test]
fn test_overlong_post_is_invalid_input() {
    let dir = TempDir::new().unwrap();
    let text = "a".repeat(281);
    xpulse(&dir)
        .env("X_ACCESS_TOKEN", "token")
        .env("X_API_BASE_URL", DEAD_API)
        .args(["post", &text])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("280"));
}

#[test]
fn test_app_only_token_cannot_post() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .env("X_BEARER_TOKEN", "app-token")
        .env("X_API_BASE_URL", DEAD_API)
        .args(["post", "hello"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("write operations"));
}

#[test]
fn test_invalid_tweet_id() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .env("X_BEARER_TOKEN", "app-token")
        .env("X_API_BASE_URL", DEAD_API)
        .args(["metrics", "not-an-id"])
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_schedule_rejects_unparseable_time() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .args(["schedule", "hello", "--at", "xyzzy"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Could not parse schedule time"));
}

#[test]
fn test_schedule_rejects_time_out_of_range() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .args(["schedule", "hello", "--at", "100000000y"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("too far in the future"));
}

#[test]
fn test_schedule_without_scheduler_config() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .args(["schedule", "hello", "--at", "2h"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("XPULSE_SCHEDULER_URL"));
}

#[test]
fn test_scheduled_rejects_unknown_status() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .env("XPULSE_SCHEDULER_URL", "http://127.0.0.1:9")
        .env("XPULSE_SCHEDULER_API_KEY", "key")
        .args(["scheduled", "--status", "queued"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid status 'queued'"));
}

#[test]
fn test_invalid_retry_setting_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .env("X_BEARER_TOKEN", "app-token")
        .env("XPULSE_MAX_RETRIES", "lots")
        .arg("profile")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("XPULSE_MAX_RETRIES"));
}

#[test]
fn test_unreachable_api_is_a_runtime_error() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .env("X_BEARER_TOKEN", "app-token")
        .env("X_API_BASE_URL", DEAD_API)
        .args(["user", "jack"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Network error"));
}

#[test]
fn test_invalid_log_format_flag() {
    let dir = TempDir::new().unwrap();
    xpulse(&dir)
        .args(["--log-format", "xml", "profile"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Invalid log format"));
}
