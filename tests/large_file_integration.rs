use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use oxipuff::locate::{ContainerFormat, locate_deflates};
use oxipuff::patch::{DiffOptions, PatchOptions, patch_file, puff_diff};
use tempfile::tempdir;

fn log_lines(lines: usize, rev: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(lines * 48);
    for i in 0..lines {
        let marker = if i % 100_000 == 0 { rev } else { 0 };
        writeln!(out, "{i:>9} INFO request served in {}ms r{marker}", i % 997).unwrap();
    }
    out
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[test]
#[ignore = "builds and diffs ~100 MiB of log data; opt-in due runtime"]
fn large_gzip_in_place_with_small_cache() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.log.gz");

    let old = gzip(&log_lines(2_000_000, 1));
    let new = gzip(&log_lines(2_000_000, 2));
    let src = locate_deflates(&old, ContainerFormat::Gzip).unwrap();
    let dst = locate_deflates(&new, ContainerFormat::Gzip).unwrap();
    let patch = puff_diff(&old, &new, &src, &dst, &DiffOptions::default()).unwrap();
    assert!(patch.len() < new.len() / 10, "patch {} of {}", patch.len(), new.len());

    std::fs::write(&path, &old).unwrap();
    let opts = PatchOptions {
        max_cache_size: 256 * 1024,
    };
    patch_file(&path, &path, None, None, &patch, &opts).unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), new);
}
