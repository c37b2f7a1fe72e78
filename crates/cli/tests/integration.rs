//! Integration tests for the pw CLI
//!
//! These tests require a running S3-compatible server with a bucket that
//! already holds a few objects.
//!
//! Run with:
//! ```bash
//! export TEST_S3_ENDPOINT=http://localhost:9000
//! export TEST_S3_ACCESS_KEY=accesskey
//! export TEST_S3_SECRET_KEY=secretkey
//! export TEST_S3_BUCKET=pagewalk-fixture   # at least 3 objects
//! cargo test -p pagewalk-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn run_pw(args: &[&str], config_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pw"))
        .args(args)
        .env("PAGEWALK_CONFIG_DIR", config_dir)
        .output()
        .expect("Failed to execute pw command")
}

struct Fixture {
    config_dir: TempDir,
    bucket: String,
}

/// Configure a `test` alias from the environment, or skip when unset
fn setup() -> Option<Fixture> {
    let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
    let access_key = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
    let secret_key = std::env::var("TEST_S3_SECRET_KEY").ok()?;
    let bucket = std::env::var("TEST_S3_BUCKET").ok()?;

    let config_dir = tempfile::tempdir().ok()?;
    let output = run_pw(
        &[
            "alias",
            "set",
            "test",
            &endpoint,
            &access_key,
            &secret_key,
            "--bucket-lookup",
            "path",
        ],
        config_dir.path(),
    );
    assert!(
        output.status.success(),
        "alias set failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    Some(Fixture { config_dir, bucket })
}

fn json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn names(value: &serde_json::Value) -> Vec<String> {
    value["entries"]
        .as_array()
        .expect("entries array")
        .iter()
        .map(|e| e["name"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_ls_buckets_includes_fixture() {
    let Some(fx) = setup() else {
        eprintln!("Skipping: TEST_S3_* not set");
        return;
    };

    let value = json(&run_pw(&["ls", "test", "--json"], fx.config_dir.path()));
    assert!(names(&value).contains(&fx.bucket));
}

#[test]
fn test_paged_walk_matches_full_listing() {
    let Some(fx) = setup() else {
        eprintln!("Skipping: TEST_S3_* not set");
        return;
    };
    let target = format!("test/{}", fx.bucket);
    let dir = fx.config_dir.path();

    let full = names(&json(&run_pw(&["ls", &target, "-r", "--json"], dir)));
    assert!(full.len() >= 3, "fixture bucket needs at least 3 objects");

    let mut paged = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut args = vec!["ls", target.as_str(), "-r", "--page", "--page-size", "2", "--json"];
        if let Some(t) = &token {
            args.extend(["--continuation-token", t.as_str()]);
        }
        let value = json(&run_pw(&args, dir));
        paged.extend(names(&value));
        match value["continuation_token"].as_str() {
            Some(next) => token = Some(next.to_string()),
            None => break,
        }
    }

    assert_eq!(paged, full);
}

#[test]
fn test_token_reused_with_other_page_size_is_rejected() {
    let Some(fx) = setup() else {
        eprintln!("Skipping: TEST_S3_* not set");
        return;
    };
    let target = format!("test/{}", fx.bucket);
    let dir = fx.config_dir.path();

    let first = json(&run_pw(
        &["ls", &target, "-r", "--page", "--page-size", "1", "--json"],
        dir,
    ));
    let token = first["continuation_token"]
        .as_str()
        .expect("more than one page")
        .to_string();

    let output = run_pw(
        &[
            "ls",
            &target,
            "-r",
            "--page",
            "--page-size",
            "2",
            "--continuation-token",
            &token,
        ],
        dir,
    );
    assert_eq!(output.status.code(), Some(8));
}

#[test]
fn test_missing_bucket_exit_code() {
    let Some(fx) = setup() else {
        eprintln!("Skipping: TEST_S3_* not set");
        return;
    };

    let output = run_pw(
        &["ls", "test/pagewalk-does-not-exist-7f3a"],
        fx.config_dir.path(),
    );
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn test_tree_json_counts() {
    let Some(fx) = setup() else {
        eprintln!("Skipping: TEST_S3_* not set");
        return;
    };
    let target = format!("test/{}", fx.bucket);

    let value = json(&run_pw(
        &["tree", &target, "--depth", "1", "--json"],
        fx.config_dir.path(),
    ));
    assert!(value["objects"].as_u64().is_some());
    assert!(value["folders"].as_u64().is_some());
}

#[test]
fn test_unknown_alias_exit_code() {
    let dir = TempDir::new().unwrap();
    let output = run_pw(&["ls", "nowhere/bucket"], dir.path());
    assert_eq!(output.status.code(), Some(5));
}
