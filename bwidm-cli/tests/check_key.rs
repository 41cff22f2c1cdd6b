//! CLI integration tests for bwidm-check-key.

use assert_cmd::Command;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn check_key() -> Command {
    Command::cargo_bin("bwidm-check-key").unwrap()
}

fn openssh_blob(algorithm: &str) -> String {
    let mut blob = Vec::new();
    for field in [algorithm.as_bytes(), &[5u8; 32][..]] {
        blob.extend_from_slice(&(field.len() as u32).to_be_bytes());
        blob.extend_from_slice(field);
    }
    STANDARD.encode(blob)
}

#[test]
fn test_sk_key_found() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("id_ed25519_sk.pub");
    fs::write(
        &file,
        format!(
            "sk-ssh-ed25519@openssh.com {} alice@yubikey\n",
            openssh_blob("sk-ssh-ed25519@openssh.com")
        ),
    )
    .unwrap();

    check_key()
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("present"));
}

#[test]
fn test_quiet_mode_prints_nothing() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("id_ed25519_sk.pub");
    fs::write(
        &file,
        format!(
            "sk-ssh-ed25519@openssh.com {} alice@yubikey\n",
            openssh_blob("sk-ssh-ed25519@openssh.com")
        ),
    )
    .unwrap();

    check_key()
        .arg("--quiet")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_plain_ed25519_key_exit_65() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("id_ed25519.pub");
    fs::write(
        &file,
        format!("ssh-ed25519 {} alice@laptop\n", openssh_blob("ssh-ed25519")),
    )
    .unwrap();

    check_key()
        .arg(&file)
        .assert()
        .code(65)
        .stderr(predicate::str::contains("No sk-ssh-ed25519@openssh.com key"));
}

#[test]
fn test_sk_label_without_marker_exit_65() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("forged.pub");
    fs::write(
        &file,
        format!(
            "sk-ssh-ed25519@openssh.com {} forged\n",
            openssh_blob("ssh-ed25519")
        ),
    )
    .unwrap();

    check_key()
        .arg(&file)
        .assert()
        .code(65)
        .stderr(predicate::str::contains("does not carry"));
}

#[test]
fn test_missing_file_exit_66() {
    let temp = TempDir::new().unwrap();

    check_key()
        .arg(temp.path().join("missing.pub"))
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read key file"));
}

#[test]
fn test_no_arguments_exit_64() {
    check_key().assert().code(64);
}
