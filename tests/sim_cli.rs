use std::path::PathBuf;
use std::process::{Command, Output};

use serde_json::Value;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fanwatch-sim"))
}

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("fanwatch-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).expect("write temp file");
    path
}

fn summary(output: &Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout utf8");
    let last = stdout.lines().last().expect("summary line");
    serde_json::from_str(last).expect("summary json")
}

#[test]
fn model_prints_embedded_pack() {
    let output = cli().arg("model").output().expect("model command");
    assert!(output.status.success());

    let model: Value = serde_json::from_slice(&output.stdout).expect("model json");
    assert_eq!(model["name"], "train_100_1_rank_0");
    assert_eq!(model["model_type"], "PME");
    assert_eq!(model["uuid"], "5f3a91c2-0b7e44d1-8a26e913-6cf052b8");
    assert_eq!(model["classes"].as_array().unwrap().len(), 7);
    assert_eq!(model["classes"][6]["label"], "tapping");
}

#[test]
fn check_config_accepts_valid_file() {
    let path = temp_file("valid.json", r#"{"voting":{"window_size":5}}"#);
    let output = cli()
        .args(["check-config", "--config", path.to_str().unwrap()])
        .output()
        .expect("check-config command");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(0));
    let check: Value = serde_json::from_slice(&output.stdout).expect("check json");
    assert_eq!(check["valid"], true);
}

#[test]
fn check_config_rejects_even_window() {
    let path = temp_file("even.json", r#"{"voting":{"window_size":4}}"#);
    let output = cli()
        .args(["check-config", "--config", path.to_str().unwrap()])
        .output()
        .expect("check-config command");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("stderr utf8");
    let line = stderr
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("error json on stderr");
    let check: Value = serde_json::from_str(line).expect("check json");
    assert_eq!(check["valid"], false);
    assert_eq!(check["code"], 2002);
}

#[test]
fn check_config_rejects_missing_file() {
    let output = cli()
        .args(["check-config", "--config", "/nonexistent/fanwatch.json"])
        .output()
        .expect("check-config command");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn run_default_scenario() {
    let output = cli()
        .args(["run", "--alert-ms", "0"])
        .output()
        .expect("run command");
    assert!(
        output.status.success(),
        "run exited with {:?}",
        output.status.code()
    );

    let summary = summary(&output);
    assert_eq!(summary["interrupts"], 1700);
    assert_eq!(summary["frames_captured"], 1700);
    assert_eq!(summary["frames_processed"], 1700);
    assert_eq!(summary["overruns"], 0);
    assert!(summary["transitions"].as_u64().unwrap() >= 1);
    assert!(summary["halt"].is_null());
    assert_eq!(summary["indicator_state"]["state"], "per_class");
}

#[test]
fn run_with_slow_loop_recovers_every_overrun() {
    let output = cli()
        .args(["run", "--alert-ms", "0", "--drain-every", "64"])
        .output()
        .expect("run command");
    assert!(output.status.success());

    let summary = summary(&output);
    let overruns = summary["overruns"].as_u64().unwrap();
    assert!(overruns >= 1);
    assert_eq!(summary["recoveries"].as_u64().unwrap(), overruns);
    assert!(summary["frames_captured"].as_u64().unwrap() < 1700);
}

#[test]
fn run_prints_reports() {
    let output = cli()
        .args(["run", "--alert-ms", "0", "--reports"])
        .output()
        .expect("run command");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout utf8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines.len() > 1);
    for line in &lines[..lines.len() - 1] {
        let report: Value = serde_json::from_str(line).expect("report json");
        assert_eq!(report["ModelNumber"], 0);
        assert!(report["Classification"].as_u64().unwrap() < 7);
        assert_eq!(report["FeatureLength"], 3);
    }
    assert_eq!(
        summary(&output)["verdicts"].as_u64().unwrap(),
        (lines.len() - 1) as u64
    );
}

#[test]
fn run_sensor_fault_exits_fatal() {
    let scenario = temp_file(
        "fault.json",
        r#"{"segments":[{"profile":"still","frames":200}],"sensor_fault_after":50}"#,
    );
    let output = cli()
        .args(["run", "--alert-ms", "0", "--scenario", scenario.to_str().unwrap()])
        .output()
        .expect("run command");
    let _ = std::fs::remove_file(&scenario);

    assert_eq!(output.status.code(), Some(3));
    let summary = summary(&output);
    assert_eq!(summary["indicator_state"]["state"], "fatal_halt");
    assert!(summary["halt"].as_str().unwrap().starts_with("sensor fault"));
    assert_eq!(summary["frames_captured"], 50);
}

#[test]
fn run_bring_up_failure_exits_fatal() {
    // Valid on its own, but the embedded model has 7 classes
    let config = temp_file("eight-classes.json", r#"{"voting":{"num_classes":8}}"#);
    let output = cli()
        .args(["run", "--alert-ms", "0", "--config", config.to_str().unwrap()])
        .output()
        .expect("run command");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8(output.stderr).expect("stderr utf8");
    let line = stderr
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("failure json on stderr");
    let failure: Value = serde_json::from_str(line).expect("failure json");
    assert_eq!(failure["halt"], "bring-up");
    assert!(output.stdout.is_empty());
}

#[test]
fn run_rejects_invalid_config() {
    let config = temp_file("run-even.json", r#"{"voting":{"window_size":4}}"#);
    let output = cli()
        .args(["run", "--alert-ms", "0", "--config", config.to_str().unwrap()])
        .output()
        .expect("run command");
    let _ = std::fs::remove_file(&config);

    assert_eq!(output.status.code(), Some(2));
}
