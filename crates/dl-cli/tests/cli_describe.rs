use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_didlab"))
}

fn repo_root() -> PathBuf {
    // crates/dl-cli -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn tmp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("didlab_cli_{}_{}_{}", std::process::id(), nanos, name));
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(out.status.success(), "command failed, stderr={}", String::from_utf8_lossy(&out.stderr));
    serde_json::from_slice(&out.stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON: {e}\n{}", String::from_utf8_lossy(&out.stdout)))
}

#[test]
fn describe_emits_panel_aggregates() {
    let panel = fixture_path("panel_small.csv");
    let out = run(&["describe", "--input", panel.to_string_lossy().as_ref()]);
    let v = stdout_json(&out);

    assert_eq!(v["schema_version"], "didlab_describe_v0");
    assert_eq!(v["meta"]["tool"], "didlab");
    assert_eq!(v["balance"]["n_obs"], 80);
    assert_eq!(v["balance"]["n_firms"], 16);
    assert_eq!(v["balance"]["n_years"], 5);
    assert_eq!(v["balance"]["balanced"], true);
    assert_eq!(v["crosstab"]["total"], 80);

    let firm_sum: u64 = v["firms_per_country"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["n_firms"].as_u64().unwrap())
        .sum();
    assert_eq!(firm_sum, 16);

    assert_eq!(v["summary"]["n_missing"], 1);
    assert_eq!(v["summary"]["n"], 79);
    assert!(v["winsor"]["n_clipped_upper"].as_u64().unwrap() >= 1);
    assert_eq!(v["group_means"].as_array().unwrap().len(), 10);
}

#[test]
fn describe_table_mode_prints_tables() {
    let panel = fixture_path("panel_small.csv");
    let out = run(&["describe", "--input", panel.to_string_lossy().as_ref(), "--table"]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("Observations by year and country"));
    assert!(text.contains("Firms per country"));
    assert!(text.contains("Winsorization"));
    assert!(text.contains("DEU") && text.contains("FRA"));
}

#[test]
fn winsorize_writes_clipped_panel() {
    let panel = fixture_path("panel_small.csv");
    let out_panel = tmp_path("winsorized.csv");
    let out = run(&[
        "winsorize",
        "--input",
        panel.to_string_lossy().as_ref(),
        "--output",
        out_panel.to_string_lossy().as_ref(),
    ]);
    let report = stdout_json(&out);
    let upper = report["winsor"]["upper_threshold"].as_f64().unwrap();
    assert!(upper < 0.45);
    assert_eq!(report["rows"], 80);

    let described = run(&["describe", "--input", out_panel.to_string_lossy().as_ref()]);
    let v = stdout_json(&described);
    let max = v["summary"]["max"].as_f64().unwrap();
    assert!((max - upper).abs() < 1e-9, "max={max} upper={upper}");
    // Missing values pass through.
    assert_eq!(v["summary"]["n_missing"], 1);

    let _ = std::fs::remove_file(&out_panel);
}

#[test]
fn describe_missing_input_names_path() {
    let out = run(&["describe", "--input", "does/not/exist.csv"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("does/not/exist.csv"), "stderr={stderr}");
}

#[test]
fn rds_input_is_rejected() {
    let out = run(&["describe", "--input", "panel.rds"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("panel.rds"));
}

#[test]
fn version_reports_tool() {
    let v = stdout_json(&run(&["version"]));
    assert_eq!(v["tool"], "didlab");
    assert!(v["version"].as_str().is_some_and(|s| !s.is_empty()));
}
