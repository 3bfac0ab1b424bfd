// Feature: Operator CLI
//   As an operator or test harness
//   I want to replay JSON-lines requests against a fresh engine
//   So that command semantics can be exercised without a transport

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn scenesync(dir: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_scenesync"));
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("SCENESYNC_LOG")
        .env_remove("SCENESYNC_LOCK_TTL_MS");
    cmd
}

fn reply_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

#[test]
fn replay_resolves_sibling_name_collisions() -> Result<(), Box<dyn std::error::Error>> {
    // GIVEN two creates of the same name under one parent
    let dir = tempfile::tempdir()?;
    let requests = dir.path().join("requests.jsonl");
    fs::write(
        &requests,
        concat!(
            r#"{"route":"command","body":{"command":{"op":"create","parentPath":[],"className":"Workspace","name":"Workspace"}}}"#,
            "\n",
            r#"{"route":"command","body":{"command":{"op":"create","parentPath":["Workspace"],"className":"Folder","name":"Folder"}}}"#,
            "\n",
            r#"{"route":"command","body":{"command":{"op":"create","parentPath":["Workspace"],"className":"Folder","name":"Folder"}}}"#,
            "\n",
        ),
    )?;

    // WHEN replayed
    let output = scenesync(&dir).arg("replay").arg(&requests).assert().success();

    // THEN the second folder is renamed
    let replies = reply_lines(&output.get_output().stdout);
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[2]["body"]["result"]["pathString"], "Workspace.Folder_2");
    Ok(())
}

#[test]
fn replay_with_seed_starts_from_resynced_tree() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let seed = dir.path().join("tree.json");
    fs::write(
        &seed,
        r#"[
            {"id":"ws","className":"Workspace","name":"Workspace"},
            {"id":"p1","className":"Part","name":"Part","parentId":"ws",
             "properties":{"Anchored":{"kind":"bool","value":true}}}
        ]"#,
    )?;
    let requests = dir.path().join("requests.jsonl");
    fs::write(&requests, "{\"route\":\"schema\",\"body\":{\"className\":\"Part\"}}\n")?;

    let output = scenesync(&dir)
        .arg("replay")
        .arg(&requests)
        .arg("--seed")
        .arg(&seed)
        .assert()
        .success();

    let replies = reply_lines(&output.get_output().stdout);
    assert_eq!(replies[0]["body"]["classes"]["Part"]["instanceCount"], 1);
    assert_eq!(
        replies[0]["body"]["classes"]["Part"]["properties"]["Anchored"]["kind"],
        "bool"
    );
    Ok(())
}

#[test]
fn replay_missing_file_exits_with_io_code() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    scenesync(&dir)
        .args(["replay", "does-not-exist.jsonl"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to open request file"));
    Ok(())
}

#[test]
fn config_prints_effective_toml() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[locks]\nttl_ms = 4321\n")?;

    scenesync(&dir)
        .arg("config")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("ttl_ms = 4321"))
        .stdout(predicate::str::contains("[idempotency]"));
    Ok(())
}

#[test]
fn invalid_config_exits_with_validation_code() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[idempotency]\ncapacity = 0\n")?;

    scenesync(&dir)
        .arg("config")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("capacity"));
    Ok(())
}

#[test]
fn missing_subcommand_shows_usage() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    scenesync(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
    Ok(())
}
