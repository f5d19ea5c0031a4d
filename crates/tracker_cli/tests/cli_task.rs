use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("tracker-{nanos}-{file_name}"))
}

fn run(store_path: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_tracker");
    Command::new(exe)
        .args(args)
        .env("TRACKER_STORE_PATH", store_path)
        .env("TRACKER_CONFIG_PATH", temp_path("no-config.json"))
        .output()
        .expect("failed to run tracker")
}

#[test]
fn help_lists_top_level_commands() {
    let output = run(&temp_path("help.csv"), &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("task"));
    assert!(stdout.contains("epic"));
    assert!(stdout.contains("prioritized"));
}

#[test]
fn add_then_list_plain_text() {
    let store_path = temp_path("cli-add-list.csv");

    let added = run(&store_path, &["task", "add", "Buy milk", "--description", "2 litres"]);
    let listed = run(&store_path, &["task", "list"]);
    std::fs::remove_file(&store_path).ok();

    assert!(added.status.success());
    assert!(String::from_utf8_lossy(&added.stdout).contains("Added task 1: Buy milk"));
    assert!(listed.status.success());
    let stdout = String::from_utf8_lossy(&listed.stdout);
    assert!(stdout.contains("Buy milk"));
    assert!(stdout.contains("NEW"));
}

#[test]
fn add_json_reports_schedule() {
    let store_path = temp_path("cli-add-json.csv");

    let output = run(
        &store_path,
        &[
            "task",
            "add",
            "Standup",
            "--start",
            "2025-06-02 09:00",
            "--duration",
            "15",
            "--json",
        ],
    );
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["id"], 1);
    assert_eq!(json["type"], "task");
    assert_eq!(json["start_time"], "2025-06-02T09:00:00");
    assert_eq!(json["end_time"], "2025-06-02T09:15:00");
    assert_eq!(json["duration_minutes"], 15);
}

#[test]
fn overlapping_task_is_rejected() {
    let store_path = temp_path("cli-conflict.csv");

    let first = run(
        &store_path,
        &["task", "add", "first", "--start", "2025-06-02 09:00", "--duration", "60"],
    );
    let second = run(
        &store_path,
        &["task", "add", "second", "--start", "2025-06-02 09:30", "--duration", "60"],
    );
    let listed = run(&store_path, &["task", "list", "--json"]);
    std::fs::remove_file(&store_path).ok();

    assert!(first.status.success());
    assert_eq!(second.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&second.stderr);
    assert!(stderr.contains("ERROR: conflict"));
    assert!(stderr.contains("existing task 1"));

    let tasks: serde_json::Value = serde_json::from_slice(&listed.stdout).unwrap();
    assert_eq!(tasks.as_array().map(Vec::len), Some(1));
}

#[test]
fn show_unknown_task_is_not_found() {
    let store_path = temp_path("cli-show-missing.csv");

    let output = run(&store_path, &["task", "show", "42"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: not_found - task 42 not found"));
}

#[test]
fn update_overlays_only_given_fields() {
    let store_path = temp_path("cli-update.csv");

    run(&store_path, &["task", "add", "draft", "--description", "keep me"]);
    let updated = run(
        &store_path,
        &["task", "update", "1", "--status", "done", "--json"],
    );
    std::fs::remove_file(&store_path).ok();

    assert!(updated.status.success());
    let json: serde_json::Value = serde_json::from_slice(&updated.stdout).unwrap();
    assert_eq!(json["title"], "draft");
    assert_eq!(json["description"], "keep me");
    assert_eq!(json["status"], "DONE");
}

#[test]
fn delete_and_clear_tasks() {
    let store_path = temp_path("cli-delete.csv");

    run(&store_path, &["task", "add", "one"]);
    run(&store_path, &["task", "add", "two"]);
    let deleted = run(&store_path, &["task", "delete", "1"]);
    let missing = run(&store_path, &["task", "delete", "1"]);
    let cleared = run(&store_path, &["task", "clear"]);
    let listed = run(&store_path, &["task", "list"]);
    std::fs::remove_file(&store_path).ok();

    assert!(String::from_utf8_lossy(&deleted.stdout).contains("Deleted task 1: one"));
    assert_eq!(missing.status.code(), Some(1));
    assert!(cleared.status.success());
    assert!(String::from_utf8_lossy(&listed.stdout).contains("No items."));
}

#[test]
fn store_flag_beats_environment() {
    let env_store = temp_path("cli-env-store.csv");
    let flag_store = temp_path("cli-flag-store.csv");
    let flag_arg = flag_store.to_string_lossy().to_string();

    let output = run(&env_store, &["--store", flag_arg.as_str(), "task", "add", "routed"]);
    let written = std::fs::read_to_string(&flag_store).unwrap_or_default();
    std::fs::remove_file(&flag_store).ok();

    assert!(output.status.success());
    assert!(written.contains("routed"));
    assert!(!env_store.exists());
}

#[test]
fn unknown_config_override_is_invalid_input() {
    let store_path = temp_path("cli-bad-override.csv");

    let output = run(
        &store_path,
        &["--config-override", "theme=noir", "task", "list"],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input - unknown config field 'theme'"));
}

#[test]
fn schedule_past_last_representable_time_is_invalid_input() {
    let store_path = temp_path("cli-late.csv");

    let output = run(
        &store_path,
        &["task", "add", "late", "--start", "9999-12-31 23:00", "--duration", "120"],
    );
    let listed = run(&store_path, &["task", "list", "--json"]);
    std::fs::remove_file(&store_path).ok();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: invalid_input"));
    assert!(stderr.contains("supported time range"));

    let tasks: serde_json::Value = serde_json::from_slice(&listed.stdout).unwrap();
    assert_eq!(tasks.as_array().map(Vec::len), Some(0));
}
