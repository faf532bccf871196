//! End-to-end tests for the mylove binary

use serde_json::{Value, json};
use std::path::Path;
use std::process::{Command, Output};

const CONFIG: &str = r#"
config_version = 1

[database]
name = "my-love-db"
version = 4

[[stores]]
name = "messages"

[[stores.indexes]]
name = "by-category"
key_path = "category"

[[stores]]
name = "moods"

[[stores.indexes]]
name = "by-date"
key_path = "date"
unique = true
"#;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

fn mylove(dir: &Path, args: &[&str]) -> Output {
    let config = write_config(dir);
    Command::new(env!("CARGO_BIN_EXE_mylove"))
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(dir.join("data"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn json_out(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_records_persist_between_runs() {
    let dir = tempfile::tempdir().unwrap();

    let added = json_out(&mylove(
        dir.path(),
        &["add", "messages", r#"{"text": "hi", "category": "love"}"#],
    ));
    assert_eq!(added, json!({ "id": 1, "text": "hi", "category": "love" }));

    let fetched = json_out(&mylove(dir.path(), &["get", "messages", "1"]));
    assert_eq!(fetched, added);
    assert!(dir.path().join("data").join("my-love-db.sqlite3").exists());

    let updated = json_out(&mylove(
        dir.path(),
        &["update", "messages", "1", r#"{"text": "hello"}"#],
    ));
    assert_eq!(updated["text"], "hello");
    assert_eq!(updated["category"], "love");

    let count = json_out(&mylove(dir.path(), &["count", "messages"]));
    assert_eq!(count["count"], 1);
}

#[test]
fn test_pages_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["A", "B", "C"] {
        let record = json!({ "name": name }).to_string();
        json_out(&mylove(dir.path(), &["add", "messages", &record]));
    }

    let page = json_out(&mylove(
        dir.path(),
        &["page", "messages", "--offset", "1", "--limit", "1"],
    ));
    assert_eq!(page, json!([{ "id": 2, "name": "B" }]));

    json_out(&mylove(dir.path(), &["delete", "messages", "2"]));
    let all = json_out(&mylove(dir.path(), &["list", "messages"]));
    assert_eq!(all, json!([{ "id": 1, "name": "A" }, { "id": 3, "name": "C" }]));

    let after = json_out(&mylove(dir.path(), &["page", "messages", "--after", "1"]));
    assert_eq!(after, json!([{ "id": 3, "name": "C" }]));
}

#[test]
fn test_failures_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();

    let missing = mylove(dir.path(), &["get", "messages", "42"]);
    assert!(!missing.status.success());

    let unknown = mylove(dir.path(), &["count", "photos"]);
    assert!(!unknown.status.success());

    json_out(&mylove(dir.path(), &["add", "moods", r#"{"date": "2025-02-14"}"#]));
    let duplicate = mylove(dir.path(), &["add", "moods", r#"{"date": "2025-02-14"}"#]);
    assert!(!duplicate.status.success());
}

#[test]
fn test_stores_and_estimate() {
    let dir = tempfile::tempdir().unwrap();

    let stores = json_out(&mylove(dir.path(), &["--in-memory", "stores"]));
    assert_eq!(stores["version"], 4);
    assert_eq!(stores["stores"][1]["indexes"][0]["unique"], true);

    let estimate = json_out(&mylove(dir.path(), &["--in-memory", "estimate"]));
    assert!(estimate["usage_bytes"].as_u64().unwrap() > 0);
    assert_eq!(estimate["quota_bytes"], Value::Null);
    assert!(!dir.path().join("data").join("my-love-db.sqlite3").exists());
}
