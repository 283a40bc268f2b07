use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dedupe_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("issue-dedupe");
    path
}

/// Writes a config pointing at a port nobody listens on, so that any
/// command reaching the network fails fast.
fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[opensearch]
url = "http://127.0.0.1:1"
index = "issues"
model_id = "test-model"
timeout_secs = 2

[logging]
level = "warn"
{}
"#,
        extra
    );

    let config_path = config_dir.join("dedupe.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dedupe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dedupe_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run issue-dedupe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(dedupe_binary()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in [
        "init-opensearch",
        "load-model",
        "create-index",
        "index",
        "dry-run",
        "test",
        "search",
        "search-id",
        "serve",
    ] {
        assert!(stdout.contains(command), "missing {command} in help: {stdout}");
    }
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_dedupe(&tmp.path().join("nope.toml"), &["search-id", "GH-1"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{stderr}");
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env("[batch]\nsearch_concurrency = 0");
    let (_, stderr, success) = run_dedupe(&config_path, &["search-id", "GH-1"]);
    assert!(!success);
    assert!(stderr.contains("batch concurrency must be >= 1"), "{stderr}");
}

#[test]
fn test_index_empty_directory() {
    let (tmp, config_path) = setup_test_env("");
    let payloads = tmp.path().join("github");
    fs::create_dir_all(&payloads).unwrap();

    let (stdout, stderr, success) = run_dedupe(
        &config_path,
        &["index", "github", "--dir", payloads.to_str().unwrap()],
    );
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 0 github documents."), "{stdout}");
}

#[test]
fn test_index_missing_directory() {
    let (tmp, config_path) = setup_test_env("");
    let missing = tmp.path().join("stack-overflow");

    let (_, stderr, success) = run_dedupe(
        &config_path,
        &["index", "stack-overflow", "--dir", missing.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Failed reading directory"), "{stderr}");
}

#[test]
fn test_index_reports_unreachable_engine() {
    let (tmp, config_path) = setup_test_env("");
    let payloads = tmp.path().join("github");
    fs::create_dir_all(&payloads).unwrap();
    fs::write(
        payloads.join("1.json"),
        r#"{
            "number": 1,
            "title": "Cart total wrong",
            "body": "coupon applied twice",
            "state": "open",
            "html_url": "https://github.com/acme/shop/issues/1",
            "created_at": "2023-03-01T10:00:00Z"
        }"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_dedupe(
        &config_path,
        &["index", "github", "--dir", payloads.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stdout.contains("FAILED GH-1"), "{stdout}");
    assert!(stderr.contains("1 documents failed to index"), "{stderr}");
}

#[test]
fn test_dry_run_rejects_unknown_source() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_dedupe(&config_path, &["dry-run", "--source", "gitlab"]);
    assert!(!success);
    assert!(stderr.contains("Unknown source 'gitlab'"), "{stderr}");
}

#[test]
fn test_dry_run_rejects_threshold_below_floor() {
    let (_tmp, config_path) = setup_test_env("");
    let (_, stderr, success) = run_dedupe(&config_path, &["dry-run", "--min-score", "1.0"]);
    assert!(!success);
    assert!(stderr.contains("--min-score"), "{stderr}");
}

#[test]
fn test_dry_run_rejects_invalid_overrides() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_dedupe(&config_path, &["dry-run", "--page-size", "0"]);
    assert!(!success);
    assert!(stderr.contains("--page-size must be >= 1"), "{stderr}");

    let (_, stderr, success) = run_dedupe(&config_path, &["dry-run", "--min-score", "NaN"]);
    assert!(!success);
    assert!(stderr.contains("--min-score"), "{stderr}");

    let (_, stderr, success) = run_dedupe(&config_path, &["dry-run", "--concurrency", "0"]);
    assert!(!success);
    assert!(stderr.contains("--concurrency must be >= 1"), "{stderr}");
}

#[test]
fn test_index_rejects_zero_concurrency() {
    let (tmp, config_path) = setup_test_env("");
    let payloads = tmp.path().join("github");
    fs::create_dir_all(&payloads).unwrap();

    let (_, stderr, success) = run_dedupe(
        &config_path,
        &["index", "github", "--dir", payloads.to_str().unwrap(), "--concurrency", "0"],
    );
    assert!(!success);
    assert!(stderr.contains("--concurrency must be >= 1"), "{stderr}");
}

#[test]
fn test_acceptance_missing_corpus() {
    let (tmp, config_path) = setup_test_env("");
    let missing = tmp.path().join("duplicates");
    let (_, stderr, success) =
        run_dedupe(&config_path, &["test", "--dir", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Failed reading directory"), "{stderr}");
}

#[test]
fn test_search_id_unreachable_engine() {
    let (_tmp, config_path) = setup_test_env("");
    let (stdout, stderr, success) = run_dedupe(&config_path, &["search-id", "GH-1"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("transport error"), "{stderr}");
}
