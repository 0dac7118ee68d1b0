use std::fs;

use assert_cmd::Command;
use tempfile::tempdir;

fn max_shim() -> Command {
    Command::cargo_bin("max-shim").unwrap()
}

#[test]
fn compose_writes_a_unit_that_lints_clean() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("wrapper.h");

    max_shim()
        .args(["compose", "--platform", "apple", "--subsystems", "host,audio,graphics"])
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains("#include <jit.common.h>"));
    assert!(text.contains("#if defined(__APPLE__)"));

    max_shim().arg("lint").arg(&output).assert().success();
}

#[test]
fn compose_rejects_missing_host() {
    max_shim()
        .args(["compose", "--platform", "other", "--subsystems", "audio"])
        .assert()
        .failure();
}

#[test]
fn lint_flags_unretracted_symbol() {
    let dir = tempdir().unwrap();
    let wrapper = dir.path().join("wrapper.h");
    fs::write(&wrapper, "#define __FILES__\n#include <ext.h>\n").unwrap();

    let output = max_shim().arg("lint").arg(&wrapper).assert().failure();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("__FILES__"));
}

#[test]
fn compose_reads_json_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("shim.json");
    fs::write(&config, r#"{ "platform": "other", "subsystems": ["max", "msp"] }"#).unwrap();

    let output = max_shim()
        .arg("compose")
        .arg("--config")
        .arg(&config)
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    assert!(stdout.contains("#include <z_dsp.h>"));
    assert!(!stdout.contains("jit.common.h"));
    assert!(!stdout.contains("FSRef"));
}

#[test]
fn compose_emits_directives_as_json() {
    let output = max_shim()
        .args(["compose", "--platform", "apple", "--subsystems", "host", "--json"])
        .assert()
        .success();
    let unit: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(unit["platform"], "apple");
    let directives = unit["directives"].as_array().unwrap();
    assert!(directives
        .iter()
        .any(|d| d["kind"] == "define" && d["name"] == "__FILES__"));
    assert!(directives
        .iter()
        .any(|d| d["kind"] == "undef" && d["name"] == "__FILES__"));
    assert!(directives
        .iter()
        .any(|d| d["kind"] == "include" && d["header"] == "ext.h"));
}
