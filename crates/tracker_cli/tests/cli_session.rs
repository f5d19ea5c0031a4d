use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(file_name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("tracker-{nanos}-{file_name}"))
}

fn run_session(store_path: &Path, script: &str) -> Output {
    let exe = env!("CARGO_BIN_EXE_tracker");
    let mut child = Command::new(exe)
        .env("TRACKER_STORE_PATH", store_path)
        .env("TRACKER_CONFIG_PATH", temp_path("no-config.json"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start interactive tracker");

    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(script.as_bytes())
        .expect("failed to write script");
    child.wait_with_output().expect("failed to wait for tracker")
}

fn last_json_line(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rev()
        .find(|line| line.starts_with('['))
        .expect("no JSON array in output");
    serde_json::from_str(line).unwrap()
}

fn ids(value: &serde_json::Value) -> Vec<u64> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_u64().unwrap())
        .collect()
}

#[test]
fn history_spans_one_session_without_duplicates() {
    let store_path = temp_path("session-history.csv");
    let script = "task add a\n\
                  task add b\n\
                  task show 1\n\
                  task show 2\n\
                  task show 1\n\
                  history --json\n\
                  exit\n";

    let output = run_session(&store_path, script);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    assert_eq!(ids(&last_json_line(&output)), vec![2, 1]);
}

#[test]
fn history_is_not_persisted_between_runs() {
    let store_path = temp_path("session-fresh.csv");

    run_session(&store_path, "task add a\ntask show 1\n");
    let output = run_session(&store_path, "history --json\n");
    std::fs::remove_file(&store_path).ok();

    assert_eq!(ids(&last_json_line(&output)), Vec::<u64>::new());
}

#[test]
fn errors_do_not_end_the_session() {
    let store_path = temp_path("session-errors.csv");
    let script = "task show 5\n\
                  bogus\n\
                  task add \"quoted title\"\n\
                  task list --json\n";

    let output = run_session(&store_path, script);
    std::fs::remove_file(&store_path).ok();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ERROR: not_found - task 5 not found"));
    assert!(stderr.contains("ERROR: invalid_input"));

    let tasks = last_json_line(&output);
    assert_eq!(tasks[0]["title"], "quoted title");
}

#[test]
fn store_flag_is_rejected_mid_session() {
    let store_path = temp_path("session-store-flag.csv");

    let output = run_session(&store_path, "--store other.csv task list\n");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("only accepted at startup"));
}
