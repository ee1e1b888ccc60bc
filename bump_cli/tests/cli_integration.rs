use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use assert_cmd::Command;
use tempfile::tempdir;

const DEPLOY_FRAME: &str = "0b0953706565642042756d7005ff00000001";
const RETRACT_FRAME: &str = "0b0953706565642042756d7005ff00000002";

// Short periods so a whole deploy/retract cycle fits in a test run
fn write_quick_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[node]
device_id = "sensor_test"

[estimator]
poll_ms = 10

[telemetry]
interval_ms = 200

[broadcast]
transient_dwell_ms = 100

[actuator]
settle_ms = 0
dwell_ms = 300
"#;
    let path = dir.path().join("quick.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn bump() -> Command {
    let mut cmd = Command::cargo_bin("bump_cli").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["encode", "deploy"], 0, DEPLOY_FRAME, "stdout")]
#[case(&["decode", RETRACT_FRAME], 0, "retract", "stdout")]
#[case(&["decode", "0x0b 09 53 70 65 65 64 20 42 75 6d 70 05 ff 00 00 00 00"], 0, "idle", "stdout")]
#[case(&["decode", "0b0953706565642042756d7005ff000000"], 1, "18", "stderr")]
#[case(&["decode", "0b094f746865722042756d7005ff00000001"], 1, "prefix", "stderr")]
#[case(&["decode", "0b0953706565642042756d7005ff00000009"], 1, "0x09", "stderr")]
#[case(&["decode", "zz"], 1, "invalid hex", "stderr")]
#[case(&["encode", "launch"], 2, "invalid value", "stderr")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let assert = bump().args(args).assert().code(code);
    match stream {
        "stdout" => assert.stdout(predicate::str::contains(needle)),
        _ => assert.stderr(predicate::str::contains(needle)),
    };
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[estimator]\npoll_ms = 0\n").unwrap();
    bump()
        .args(["--config", path.to_str().unwrap(), "self-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("estimator.poll_ms"));
}

#[test]
fn wrong_identity_length_is_a_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("name.toml");
    fs::write(&path, "[identity]\nname = \"Bump\"\n").unwrap();
    bump()
        .args(["--config", path.to_str().unwrap(), "encode", "idle"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("identity.name"));
}

#[test]
fn missing_config_file_is_a_config_error() {
    bump()
        .args(["--config", "/definitely/not/here.toml", "self-check"])
        .assert()
        .code(2);
}

#[test]
fn json_errors_are_structured() {
    let out = bump()
        .args(["--json", "decode", "0b09"])
        .assert()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let line = String::from_utf8(out).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.lines().last().unwrap()).unwrap();
    assert_eq!(v["reason"], "Decode");
    assert!(v["message"].as_str().unwrap().contains("18"));
}

#[test]
fn simulate_speeding_vehicle_deploys_and_retracts() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);
    bump()
        .args(["--config", cfg.to_str().unwrap(), "simulate", "--duration-ms", "1500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deployed (#1)"))
        .stdout(predicate::str::contains(
            "simulation complete: deployments=1 retractions=1",
        ))
        .stdout(predicate::str::contains("telemetry /device/data"));
}

#[test]
fn simulate_slow_vehicle_never_deploys() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);
    // 10 cm in 400 ms is 25 cm/s, below the 50 cm/s threshold
    bump()
        .args([
            "--config",
            cfg.to_str().unwrap(),
            "simulate",
            "--vehicle",
            "25",
            "--duration-ms",
            "1000",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("deployments=0"));
}

#[test]
fn simulate_replays_trace_csv() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);
    let trace = dir.path().join("trace.csv");
    fs::write(
        &trace,
        "t_ms,sensor_a_cm,sensor_b_cm\n0,400,400\n100,20,400\n110,400,400\n140,400,20\n150,400,400\n",
    )
    .unwrap();
    bump()
        .args([
            "--config",
            cfg.to_str().unwrap(),
            "simulate",
            "--trace",
            trace.to_str().unwrap(),
            "--duration-ms",
            "1200",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("deployments=1"));
}

#[test]
fn bad_trace_header_is_reported() {
    let dir = tempdir().unwrap();
    let trace = dir.path().join("bad.csv");
    fs::write(&trace, "time,a,b\n0,1,2\n").unwrap();
    bump()
        .args(["simulate", "--trace", trace.to_str().unwrap()])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("t_ms,sensor_a_cm,sensor_b_cm"));
}

#[test]
fn actuator_node_obeys_frames_from_stdin() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);
    bump()
        .args(["--config", cfg.to_str().unwrap(), "actuator", "--duration-ms", "800"])
        .write_stdin(format!("not-a-frame\n{DEPLOY_FRAME}\n"))
        .assert()
        .success()
        .stdout(predicate::str::contains("retracted (park)"))
        .stdout(predicate::str::contains("deployed (#1)"));
}

#[test]
fn sensor_node_broadcasts_remote_commands() {
    let dir = tempdir().unwrap();
    let cfg = write_quick_config(&dir);
    bump()
        .args(["--config", cfg.to_str().unwrap(), "sensor", "--duration-ms", "600"])
        .write_stdin("/device/bump deploy\n/device/upgrade fw-2.bin\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("advertised idle"))
        .stdout(predicate::str::contains(format!("advertised deploy {DEPLOY_FRAME}")))
        .stdout(predicate::str::contains("firmware update offered: fw-2.bin"));
}
