//! Integration tests for the `netpresence` CLI binary.
//!
//! Argument parsing, completions, config handling, and registry inspection.
//! Nothing here touches the network.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the binary with env isolation: config and data
/// directories point into `home`, and no `NETPRESENCE_*` override leaks in.
fn np_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("netpresence");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("NETPRESENCE_CONFIG")
        .env_remove("NETPRESENCE_OUTPUT")
        .env_remove("NETPRESENCE_DATA_DIR")
        .env_remove("NETPRESENCE_DEBUG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// A config file whose data directory holds a two-device registry.
fn seeded(home: &TempDir) -> PathBuf {
    let data = home.path().join("np-data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(
        data.join("registry.json"),
        r#"{
  "schema_version": 2,
  "devices": {
    "presence-000000000000000000000000000000aa": {
      "id": "presence-000000000000000000000000000000aa",
      "mac": "00:1A:11:00:00:AA",
      "ip": "192.168.1.10",
      "display_name": "Phone",
      "name_source": "user",
      "first_seen": "2026-01-01T00:00:00Z",
      "last_seen": "2026-01-01T00:05:00Z",
      "adopted": true
    },
    "presence-000000000000000000000000000000bb": {
      "id": "presence-000000000000000000000000000000bb",
      "mac": "02:42:AC:00:00:BB",
      "ip": "192.168.1.50",
      "display_name": "Presence - 192.168.1.50",
      "first_seen": "2026-01-01T00:00:00Z"
    }
  }
}"#,
    )
    .unwrap();

    let config = home.path().join("config.toml");
    std::fs::write(&config, format!("data_dir = {:?}\n", data.display().to_string())).unwrap();
    config
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = np_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    np_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("scan"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    np_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("netpresence"));
}

#[test]
fn test_invalid_subcommand() {
    let home = TempDir::new().unwrap();
    let output = np_cmd(home.path()).arg("foobar").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(
        text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_run_rejects_bad_tick() {
    let home = TempDir::new().unwrap();
    np_cmd(home.path())
        .args(["run", "--tick", "soon"])
        .assert()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    let home = TempDir::new().unwrap();
    np_cmd(home.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    let home = TempDir::new().unwrap();
    np_cmd(home.path())
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honors_flag() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("custom.toml");
    np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_show() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("nested").join("config.toml");

    np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote default configuration"));
    assert!(path.exists());

    np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "init"])
        .assert()
        .success()
        .stderr(predicate::str::contains("already exists"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"time_window_minutes\": 10")
                .and(predicate::str::contains("\"shard_count\": 3")),
        );
}

#[test]
fn test_config_show_table_is_toml() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.toml");
    std::fs::write(&path, "use_brute_force = false\n").unwrap();

    np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("use_brute_force = false")
                .and(predicate::str::contains("[scan]")),
        );
}

#[test]
fn test_zero_tunable_is_rejected() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.toml");
    std::fs::write(&path, "[scan]\nshard_count = 0\n").unwrap();

    let output = np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let text = combined_output(&output);
    assert!(text.contains("scan.shard_count"), "Expected the key in the error:\n{text}");
}

#[test]
fn test_invalid_config_exit_code() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.toml");
    std::fs::write(&path, "network_interface = \"satellite\"\n").unwrap();

    let output = np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["devices", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

// ── Devices ─────────────────────────────────────────────────────────

#[test]
fn test_devices_empty_registry() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.toml");
    std::fs::write(
        &path,
        format!("data_dir = {:?}\n", home.path().join("empty").display().to_string()),
    )
    .unwrap();

    np_cmd(home.path())
        .arg("--config")
        .arg(&path)
        .args(["devices", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_devices_list_and_filter() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("presence-000000000000000000000000000000aa")
                .and(predicate::str::contains("presence-000000000000000000000000000000bb")),
        );

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "list", "--adopted", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("000000aa")
                .and(predicate::str::contains("000000bb").not()),
        );
}

#[test]
fn test_devices_get_by_mac() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "get", "00-1a-11-00-00-aa", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"display_name\": \"Phone\"")
                .and(predicate::str::contains("\"last_seen\": null")),
        );
}

#[test]
fn test_devices_get_missing() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    let output = np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "get", "presence-nope"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    let text = combined_output(&output);
    assert!(text.contains("not found"), "Expected not-found error:\n{text}");
}

#[test]
fn test_devices_remove_persists() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "remove", "presence-000000000000000000000000000000bb"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("000000bb").not());
}

#[test]
fn test_devices_adopt_known_and_unseen() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "adopt", "presence-000000000000000000000000000000bb", "--name", "Laptop"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Adopted Laptop"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "adopt", "aa-bb-cc-00-00-01", "--ip", "192.168.1.77"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Seeded and adopted"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "list", "--adopted", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"display_name\": \"Laptop\"")
                .and(predicate::str::contains("\"ip\": \"192.168.1.77\""))
                .and(predicate::str::contains("\"display_name\": \"Phone\"")),
        );
}

#[test]
fn test_devices_adopt_rejects_garbage() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "adopt", "kitchen-lamp"])
        .assert()
        .code(2);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "adopt", "presence-unknown"])
        .assert()
        .code(4);
}

#[test]
fn test_devices_mute_and_unmute() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "mute", "00:1a:11:00:00:aa", "2h"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Muted"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "get", "00:1a:11:00:00:aa", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mute_until\": null").not());

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "mute", "00:1a:11:00:00:aa", "0s"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Unmuted"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "get", "00:1a:11:00:00:aa", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mute_until\": null"));
}

#[test]
fn test_devices_collect_toggles() {
    let home = TempDir::new().unwrap();
    let config = seeded(&home);

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "collect", "00:1a:11:00:00:aa", "off"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Data collection off"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "get", "00:1a:11:00:00:aa", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"data_collection_enabled\": false"));

    np_cmd(home.path())
        .arg("--config")
        .arg(&config)
        .args(["devices", "collect", "00:1a:11:00:00:aa", "maybe"])
        .assert()
        .code(2);
}
