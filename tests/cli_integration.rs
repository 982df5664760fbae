use std::io::Write;
use std::process::Command;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_oxipuff").to_string()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn text(tag: &str) -> Vec<u8> {
    (0..2000)
        .flat_map(|i| format!("{tag} record {i} payload {}\n", i * 7 % 31).into_bytes())
        .collect()
}

#[test]
fn cli_diff_patch_roundtrip() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.gz");
    let new = dir.path().join("new.gz");
    let patch = dir.path().join("delta.puf");
    let out = dir.path().join("out.gz");
    std::fs::write(&old, gzip(&text("alpha"))).unwrap();
    std::fs::write(&new, gzip(&text("beta"))).unwrap();

    let st = Command::new(bin())
        .args(["diff", "--src-format", "gzip", "--dst-format", "gzip"])
        .arg(&old)
        .arg(&new)
        .arg(&patch)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(&std::fs::read(&patch).unwrap()[..4], b"PUF1");

    let st = Command::new(bin())
        .args(["patch", "--cache-size", "1M"])
        .arg(&old)
        .arg(&patch)
        .arg(&out)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&new).unwrap());
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.gz");
    let output = dir.path().join("out.puff");
    std::fs::write(&input, gzip(b"hello hello hello")).unwrap();
    std::fs::write(&output, b"existing").unwrap();

    let st = Command::new(bin())
        .args(["puff", "--format", "gzip"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&output).unwrap(), b"existing");

    let st = Command::new(bin())
        .args(["--force", "puff", "--format", "gzip"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
}

#[test]
fn cli_puffhuff_and_locate() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.gz");
    std::fs::write(&input, gzip(&text("gamma"))).unwrap();

    let st = Command::new(bin())
        .args(["puffhuff", "--format", "gzip"])
        .arg(&input)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .args(["locate", "--format", "gzip"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.lines().next().unwrap().starts_with("80:"));
}

#[test]
fn cli_reports_corrupt_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bin");
    std::fs::write(&input, b"not a gzip file").unwrap();

    let out = Command::new(bin())
        .args(["locate", "--format", "gzip"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("gzip"));
}

#[test]
fn cli_patch_to_stdout() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old.gz");
    let new = dir.path().join("new.gz");
    let patch = dir.path().join("delta.puf");
    std::fs::write(&old, gzip(&text("one"))).unwrap();
    std::fs::write(&new, gzip(&text("two"))).unwrap();

    let st = Command::new(bin())
        .args(["diff", "--src-format", "gzip", "--dst-format", "gzip"])
        .arg(&old)
        .arg(&new)
        .arg(&patch)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .arg("patch")
        .arg(&old)
        .arg(&patch)
        .arg("-")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(out.stdout, std::fs::read(&new).unwrap());
}
