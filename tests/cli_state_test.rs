//! Integration tests for the state map: tracking, backup and recovery.

mod common;

use common::{TestEnv, stdout_json};
use predicates::prelude::*;
use std::fs;

#[test]
fn test_track_file() {
    let env = TestEnv::setup();
    let file = env.write_file("out/main.rs", "fn main() {}\n");

    let output = env.authed().arg("track").arg(&file).output().unwrap();
    assert!(output.status.success(), "{:?}", output);
    let json = stdout_json(&output);
    assert_eq!(json["size"], 13);
    assert_eq!(json["functions"], serde_json::json!([]));
    assert!(json["path"].as_str().unwrap().ends_with("main.rs"));

    assert!(env.state_file().exists());
}

#[test]
fn test_track_requires_token() {
    let env = TestEnv::setup();
    let file = env.write_file("out/main.rs", "x");
    env.cust()
        .arg("track")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Access denied"));
    assert!(!env.state_file().exists());
}

#[test]
fn test_track_outside_allowed_directories() {
    let env = TestEnv::setup();
    let file = env.write_file("private/notes.txt", "x");
    env.authed()
        .arg("track")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not allowed"));
}

#[test]
fn test_track_rejects_dotdot_escape() {
    let env = TestEnv::setup();
    env.write_file("secret.txt", "x");
    env.authed()
        .arg("track")
        .arg(env.output_dir().join("../secret.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Path not allowed"));
}

#[test]
fn test_track_missing_file() {
    let env = TestEnv::setup();
    env.authed()
        .arg("track")
        .arg(env.output_dir().join("ghost.rs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_second_save_creates_backup() {
    let env = TestEnv::setup();
    let a = env.write_file("out/a.rs", "a");
    let b = env.write_file("out/b.rs", "bb");

    env.authed().arg("track").arg(&a).assert().success();
    let first = fs::read(env.state_file()).unwrap();
    env.authed().arg("track").arg(&b).assert().success();

    let backup = env.state_file().with_file_name("code_map.json.bak");
    assert_eq!(fs::read(backup).unwrap(), first);
}

#[test]
fn test_state_recovers_from_backup() {
    let env = TestEnv::setup();
    let a = env.write_file("out/a.rs", "a");
    let b = env.write_file("out/b.rs", "bb");
    env.authed().arg("track").arg(&a).assert().success();
    env.authed().arg("track").arg(&b).assert().success();

    fs::write(env.state_file(), "{ truncated").unwrap();

    let output = env.authed().args(["state", "show"]).output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    // The backup is one generation behind: only a.rs.
    assert_eq!(json["count"], 1);

    // Primary was restored on load.
    let healed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(env.state_file()).unwrap()).unwrap();
    assert_eq!(healed["files"].as_object().unwrap().len(), 1);
}

#[test]
fn test_state_both_corrupt_is_empty() {
    let env = TestEnv::setup();
    fs::create_dir_all(env.state_file().parent().unwrap()).unwrap();
    fs::write(env.state_file(), "nope").unwrap();
    fs::write(env.state_file().with_file_name("code_map.json.bak"), "nope").unwrap();

    env.authed()
        .args(["state", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""count":0"#));
}

#[test]
fn test_state_get_and_forget() {
    let env = TestEnv::setup();
    let file = env.write_file("out/lib.rs", "pub fn f() {}\n");
    env.authed().arg("track").arg(&file).assert().success();

    env.authed()
        .args(["state", "get"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""size":14"#));

    env.authed()
        .arg("forget")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""removed":true"#));

    env.authed()
        .args(["state", "get"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not tracked"));
}

#[test]
fn test_state_show_human() {
    let env = TestEnv::setup();
    env.authed()
        .args(["state", "show", "-H"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No files tracked."));
}
