//! End-to-end tests for the `foundry-policy` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("foundry-policy").unwrap();
    cmd.env_remove("POLICY_DIR")
        .env_remove("OPA_AUDIT_LOG")
        .env_remove("FOUNDRY_CONFIG")
        .env_remove("FOUNDRY_ENGINE");
    cmd
}

fn write_policy(dir: &Path, name: &str, package: &str) {
    std::fs::write(dir.join(name), format!("package {}\n\ndefault allow = false\n", package)).unwrap();
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    if content.len() < 0x80 {
        out.push(content.len() as u8);
    } else {
        out.extend_from_slice(&[0x81, content.len() as u8]);
    }
    out.extend_from_slice(content);
    out
}

fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(0x30, &parts.concat())
}

fn sample_crl() -> Vec<u8> {
    let algorithm = seq(&[
        tlv(0x06, &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b]),
        tlv(0x05, &[]),
    ]);
    let issuer = seq(&[tlv(
        0x31,
        &seq(&[tlv(0x06, &[0x55, 0x04, 0x03]), tlv(0x0c, b"Foundry Test CA")]),
    )]);
    let revoked = seq(&[
        seq(&[tlv(0x02, &[0x12, 0x34]), tlv(0x17, b"240101000000Z")]),
        seq(&[tlv(0x02, &[0x00, 0xab, 0xcd, 0xef]), tlv(0x17, b"240101000000Z")]),
    ]);
    let tbs = seq(&[
        tlv(0x02, &[0x01]),
        algorithm.clone(),
        issuer,
        tlv(0x17, b"240101000000Z"),
        tlv(0x17, b"240108000000Z"),
        revoked,
    ]);
    seq(&[tbs, algorithm, tlv(0x03, &[0x00, 0xde, 0xad, 0xbe, 0xef])])
}

#[test]
fn test_bundle_version_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    write_policy(dir.path(), "spawn.rego", "foundry.spawn");
    write_policy(dir.path(), "train.rego", "foundry.train");

    let first = cli()
        .args(["--policy-dir", dir.path().to_str().unwrap(), "bundle", "version"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let version = String::from_utf8(first).unwrap();
    assert_eq!(version.trim().len(), 64);

    cli()
        .args(["--policy-dir", dir.path().to_str().unwrap(), "bundle", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains(version.trim()));
}

#[test]
fn test_bundle_manifest_json() {
    let dir = tempfile::tempdir().unwrap();
    write_policy(dir.path(), "spawn.rego", "foundry.spawn");

    cli()
        .args([
            "--policy-dir",
            dir.path().to_str().unwrap(),
            "--output",
            "json",
            "bundle",
            "manifest",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"foundry.spawn\""))
        .stdout(predicate::str::contains("\"spawn.rego\""));
}

#[test]
fn test_bundle_archive_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let policies = dir.path().join("policies");
    std::fs::create_dir_all(&policies).unwrap();
    write_policy(&policies, "spawn.rego", "foundry.spawn");
    let out = dir.path().join("dist/bundle.tar.gz");

    cli()
        .args([
            "--policy-dir",
            policies.to_str().unwrap(),
            "bundle",
            "archive",
            "--out",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 1 modules"));

    assert!(out.exists());
}

#[test]
fn test_duplicate_packages_fail() {
    let dir = tempfile::tempdir().unwrap();
    write_policy(dir.path(), "a.rego", "a.b");
    write_policy(dir.path(), "b.rego", "a.b");

    cli()
        .args(["--policy-dir", dir.path().to_str().unwrap(), "bundle", "version"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Duplicate policy package"));
}

#[test]
fn test_crl_inspect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("revoked.crl");
    std::fs::write(&path, sample_crl()).unwrap();

    cli()
        .args(["crl", "inspect", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("1234"))
        .stdout(predicate::str::contains("abcdef"));
}

#[test]
fn test_crl_inspect_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.crl");
    std::fs::write(&path, b"not-a-crl").unwrap();

    cli()
        .args(["crl", "inspect", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("parse"));
}

#[test]
fn test_eval_unreachable_engine_is_infrastructure_failure() {
    cli()
        .args([
            "--engine",
            "http://127.0.0.1:1",
            "eval",
            "foundry/spawn",
            "--input",
            r#"{"tenant":"blue"}"#,
            "--ensure",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("connection error"));
}

#[test]
fn test_publish_failures_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    write_policy(dir.path(), "spawn.rego", "foundry.spawn");

    cli()
        .args([
            "--policy-dir",
            dir.path().to_str().unwrap(),
            "--engine",
            "http://127.0.0.1:1",
            "publish",
        ])
        .assert()
        .code(2)
        .stderr(predicate::function(|stderr: &str| {
            stderr.matches("foundry/spawn").count() == 1
        }));
}

#[test]
fn test_eval_rejects_non_object_input() {
    cli()
        .args(["eval", "foundry/spawn", "--input", "[1]"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("JSON object"));
}
