use std::io::Write;

use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use oxipuff::error::ErrorKind;
use oxipuff::extent::ByteExtent;
use oxipuff::locate::{
    ContainerFormat, locate_deflate_bodies, locate_deflates, locate_deflates_in_gzip,
    locate_deflates_in_zip_archive, locate_deflates_in_zlib, locate_deflates_in_zlib_blocks,
};
use oxipuff::utils::puff_huff_verify;

fn sample(n: usize) -> Vec<u8> {
    (0..n)
        .flat_map(|i| format!("line {i}: the quick brown fox {}\n", i % 17).into_bytes())
        .collect()
}

fn raw_deflate(data: &[u8]) -> Vec<u8> {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// A local file header followed by the entry data.
fn zip_entry(name: &str, method: u16, body: &[u8], uncompressed: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0403_4B50u32.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&method.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&(uncompressed as u32).to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(body);
    out
}

#[test]
fn zlib_body_extent() {
    let data = sample(400);
    let z = zlib(&data);
    let body = locate_deflates_in_zlib(&z).unwrap();
    assert_eq!(body, ByteExtent::new(2, z.len() as u64 - 6));

    let deflates = locate_deflates(&z, ContainerFormat::Zlib).unwrap();
    assert!(puff_huff_verify(&z, &deflates).unwrap());
}

#[test]
fn zlib_streams_inside_a_larger_file() {
    let (a, b) = (zlib(&sample(100)), zlib(&sample(300)));
    let mut file = b"prefix".to_vec();
    let first = ByteExtent::new(file.len() as u64, a.len() as u64);
    file.extend_from_slice(&a);
    file.extend_from_slice(b"middle");
    let second = ByteExtent::new(file.len() as u64, b.len() as u64);
    file.extend_from_slice(&b);

    let blocks = locate_deflates_in_zlib_blocks(&file, &[first, second]).unwrap();
    assert_eq!(blocks[0].offset, (first.offset + 2) * 8);
    assert!(blocks.last().unwrap().end_byte() <= second.end() - 4);
    assert!(puff_huff_verify(&file, &blocks).unwrap());
}

#[test]
fn gzip_members() {
    let (one, two) = (sample(50), sample(500));
    let (g1, g2) = (gzip(&one), gzip(&two));
    let mut file = g1.clone();
    file.extend_from_slice(&g2);

    let bodies = locate_deflates_in_gzip(&file).unwrap();
    assert_eq!(
        bodies,
        vec![
            ByteExtent::new(10, g1.len() as u64 - 18),
            ByteExtent::new(g1.len() as u64 + 10, g2.len() as u64 - 18),
        ]
    );
    let deflates = locate_deflates(&file, ContainerFormat::Gzip).unwrap();
    assert!(puff_huff_verify(&file, &deflates).unwrap());
}

#[test]
fn gzip_needs_magic() {
    let err = locate_deflates_in_gzip(b"definitely not gzip").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn zip_entries() {
    let (a, b) = (sample(200), sample(20));
    let (da, db) = (raw_deflate(&a), raw_deflate(&b));
    let mut archive = zip_entry("a.txt", 8, &da, a.len());
    archive.extend(zip_entry("stored.bin", 0, b"stored data", 11));
    let second = archive.len() as u64 + 30 + 5;
    archive.extend(zip_entry("b.txt", 8, &db, b.len()));
    archive.extend_from_slice(b"PK\x01\x02 central directory would follow");

    let bodies = locate_deflates_in_zip_archive(&archive).unwrap();
    assert_eq!(
        bodies,
        vec![
            ByteExtent::new(35, da.len() as u64),
            ByteExtent::new(second, db.len() as u64),
        ]
    );
    let deflates = locate_deflates(&archive, ContainerFormat::Zip).unwrap();
    assert!(puff_huff_verify(&archive, &deflates).unwrap());
}

#[test]
fn zip_with_data_descriptor_sizes() {
    let data = sample(64);
    let body = raw_deflate(&data);
    let mut archive = zip_entry("x", 8, &body, data.len());
    // Sizes live in a trailing data descriptor instead.
    archive[18..26].fill(0);
    let bodies = locate_deflates_in_zip_archive(&archive).unwrap();
    assert_eq!(bodies, vec![ByteExtent::new(31, body.len() as u64)]);
}

#[test]
fn raw_format_is_whole_file() {
    let body = raw_deflate(&sample(10));
    let bodies = locate_deflate_bodies(&body, ContainerFormat::Raw).unwrap();
    assert_eq!(bodies, vec![ByteExtent::new(0, body.len() as u64)]);
}
