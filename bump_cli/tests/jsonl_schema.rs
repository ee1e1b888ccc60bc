//! `--json` output is one JSON object per stdout line.

use assert_cmd::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON: {l:?}: {e}")))
        .collect()
}

#[test]
fn encode_json_has_command_and_payload() {
    let out = Command::cargo_bin("bump_cli")
        .unwrap()
        .args(["--json", "encode", "retract"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let lines = json_lines(&out.stdout);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["command"], "retract");
    assert_eq!(lines[0]["payload"], "0b0953706565642042756d7005ff00000002");
}

#[test]
fn simulate_json_stream_ends_with_summary() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("quick.toml");
    fs::write(
        &cfg,
        "[estimator]\npoll_ms = 10\n[telemetry]\ninterval_ms = 200\n[broadcast]\ntransient_dwell_ms = 100\n[actuator]\nsettle_ms = 0\ndwell_ms = 300\n",
    )
    .unwrap();
    let out = Command::cargo_bin("bump_cli")
        .unwrap()
        .args([
            "--json",
            "--config",
            cfg.to_str().unwrap(),
            "simulate",
            "--duration-ms",
            "1200",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let lines = json_lines(&out.stdout);

    let summary = lines.last().unwrap();
    assert_eq!(summary["kind"], "summary");
    assert_eq!(summary["deployments"], 1);

    let telemetry: Vec<_> = lines.iter().filter(|v| v["kind"] == "telemetry").collect();
    assert!(!telemetry.is_empty());
    let report = &telemetry[0]["report"];
    assert_eq!(telemetry[0]["topic"], "/device/data");
    assert!(report["device"].is_string());
    assert!(report["data"]["num_cars"].is_u64());
    assert!(report["data"]["sensor_1_up"].is_boolean());
    assert_eq!(summary["telemetry"].as_u64().unwrap() as usize, telemetry.len());
}
