//! End-to-end tests for the `backup-tool` binary: argument handling and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn source_tree() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("root");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), b"hi").unwrap();
    temp_dir
}

fn backup_tool() -> Command {
    let mut cmd = Command::cargo_bin("backup-tool").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_runs() {
    backup_tool().arg("--help").assert().success();
    backup_tool().args(["backup", "--help"]).assert().success();
}

#[test]
fn test_missing_destination_is_rejected() {
    let temp_dir = source_tree();
    backup_tool()
        .args(["backup", "--source"])
        .arg(temp_dir.path().join("root"))
        .assert()
        .failure();
}

#[test]
fn test_unknown_strategy_is_rejected() {
    let temp_dir = source_tree();
    let dest = temp_dir.path().join("d1");
    backup_tool()
        .args(["backup", "--strategy", "mirror", "--source"])
        .arg(temp_dir.path().join("root"))
        .arg("--dest")
        .arg(&dest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backup strategy"));
    assert!(!dest.exists());
}

#[test]
fn test_copy_to_comma_separated_destinations() {
    let temp_dir = source_tree();
    let d1 = temp_dir.path().join("d1");
    let d2 = temp_dir.path().join("d2");

    backup_tool()
        .args(["backup", "-t", "copy", "-s"])
        .arg(temp_dir.path().join("root"))
        .arg("-d")
        .arg(format!("{},{}", d1.display(), d2.display()))
        .assert()
        .success();

    for dest in [d1, d2] {
        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"hi");
        assert!(dest.join("sub").is_dir());
    }
}

#[test]
fn test_compress_writes_archive() {
    let temp_dir = source_tree();
    let out = temp_dir.path().join("out");

    backup_tool()
        .args(["backup", "--strategy", "compress", "--source"])
        .arg(temp_dir.path().join("root"))
        .arg("--dest")
        .arg(&out)
        .assert()
        .success();

    let archives: Vec<_> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("root_"));
    assert!(archives[0].ends_with(".tar.zst"));
}

#[test]
fn test_missing_source_fails() {
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("d1");

    backup_tool()
        .args(["backup", "--source"])
        .arg(temp_dir.path().join("does-not-exist"))
        .arg("--dest")
        .arg(&dest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Validation error"));
    assert!(!dest.exists());
}

#[test]
fn test_remote_destination_fails_run_but_local_completes() {
    let temp_dir = source_tree();
    let local = temp_dir.path().join("local");

    backup_tool()
        .args(["backup", "--source"])
        .arg(temp_dir.path().join("root"))
        .arg("--dest")
        .arg(format!("s3://bucket/backups,{}", local.display()))
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 2 destinations failed"));

    assert_eq!(fs::read(local.join("a.txt")).unwrap(), b"hi");
}

#[test]
fn test_config_file_selects_codec() {
    let temp_dir = source_tree();
    let out = temp_dir.path().join("out");
    let config = temp_dir.path().join("backup.toml");
    fs::write(
        &config,
        "[archive]\ncompression = \"gzip\"\ntimestamp_format = \"fixed\"\n",
    )
    .unwrap();

    backup_tool()
        .arg("--config")
        .arg(&config)
        .args(["backup", "-t", "archive", "-s"])
        .arg(temp_dir.path().join("root"))
        .arg("-d")
        .arg(&out)
        .assert()
        .success();

    assert!(out.join("root_fixed.tar.gz").is_file());
}
