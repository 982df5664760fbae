// Patch creation.

use std::io::Cursor;

use log::{debug, info};

use super::header::{PatchHeader, StreamInfo, write_patch};
use crate::error::{Error, Result, invalid};
use crate::extent::BitExtent;
use crate::locate::find_puff_locations;
use crate::puffin_stream::{DEFAULT_MAX_CACHE_SIZE, PuffinStream};
use crate::stream::{MemoryStream, Stream, read_all};
use crate::utils::huff;

/// Tuning for the bsdiff matcher.
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Matches shorter than this are not worth a control entry.
    pub small_match: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { small_match: 12 }
    }
}

/// Puff `stream` through its deflate extents, returning the layout and the
/// puffed bytes.
fn puff_stream<S: Stream + ?Sized>(
    stream: &mut S,
    deflates: &[BitExtent],
) -> Result<(StreamInfo, Vec<u8>)> {
    let (puffs, puff_length) = find_puff_locations(stream, deflates)?;
    let mut puffin = PuffinStream::create_for_puff(
        &mut *stream,
        deflates.to_vec(),
        puffs.clone(),
        puff_length,
        DEFAULT_MAX_CACHE_SIZE,
    )?;
    let puffed = read_all(&mut puffin)?;
    let info = StreamInfo {
        deflates: deflates.to_vec(),
        puffs,
        puff_length,
    };
    Ok((info, puffed))
}

/// Huff `puffed` back and require the bytes of `stream`. Nonzero bits after
/// the last block of an extent do not survive puffing.
fn verify_huff<S: Stream + ?Sized>(
    stream: &mut S,
    info: &StreamInfo,
    puffed: &[u8],
) -> Result<()> {
    let original = read_all(stream)?;
    let huffed = huff(puffed, &info.deflates, &info.puffs)?;
    if huffed == original {
        return Ok(());
    }
    let at = huffed
        .iter()
        .zip(&original)
        .position(|(a, b)| a != b)
        .unwrap_or(huffed.len().min(original.len()));
    Err(invalid(format!(
        "destination does not survive puff/huff: first difference at byte {at}"
    )))
}

/// Diff two streams whose deflate blocks sit at `src_deflates` and
/// `dst_deflates`, producing a patch.
pub fn puff_diff_streams<S, D>(
    src: &mut S,
    dst: &mut D,
    src_deflates: &[BitExtent],
    dst_deflates: &[BitExtent],
    options: &DiffOptions,
) -> Result<Vec<u8>>
where
    S: Stream + ?Sized,
    D: Stream + ?Sized,
{
    let (src_info, src_puff) = puff_stream(src, src_deflates)?;
    let (dst_info, dst_puff) = puff_stream(dst, dst_deflates)?;
    verify_huff(dst, &dst_info, &dst_puff)?;
    debug!(
        "puffed source {} -> {} bytes, destination {} -> {} bytes",
        src.size()?,
        src_puff.len(),
        dst.size()?,
        dst_puff.len()
    );

    let mut payload = Vec::new();
    qbsdiff::Bsdiff::new(&src_puff, &dst_puff)
        .small_match(options.small_match)
        .compare(Cursor::new(&mut payload))
        .map_err(Error::Io)?;

    let header = PatchHeader {
        src: src_info,
        dst: dst_info,
    };
    let patch = write_patch(&header, &payload)?;
    info!(
        "patch: {} bytes ({} deflates in source, {} in destination)",
        patch.len(),
        header.src.deflates.len(),
        header.dst.deflates.len()
    );
    Ok(patch)
}

/// Diff two in-memory files.
pub fn puff_diff(
    src: &[u8],
    dst: &[u8],
    src_deflates: &[BitExtent],
    dst_deflates: &[BitExtent],
    options: &DiffOptions,
) -> Result<Vec<u8>> {
    puff_diff_streams(
        &mut MemoryStream::for_read(src),
        &mut MemoryStream::for_read(dst),
        src_deflates,
        dst_deflates,
        options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::extent::ByteExtent;
    use crate::patch::header::read_patch;

    const FIXED_12345: [u8; 7] = [0x63, 0x64, 0x62, 0x66, 0x61, 0x05, 0x00];

    #[test]
    fn header_records_both_layouts() {
        let mut src = b"HDR!".to_vec();
        src.extend_from_slice(&FIXED_12345);
        let dst = FIXED_12345.to_vec();

        let patch = puff_diff(
            &src,
            &dst,
            &[BitExtent::new(32, 50)],
            &[BitExtent::new(0, 50)],
            &DiffOptions::default(),
        )
        .unwrap();
        let (header, payload) = read_patch(&patch).unwrap();
        assert_eq!(header.src.puffs, vec![ByteExtent::new(4, 11)]);
        assert_eq!(header.src.puff_length, 15);
        assert_eq!(header.dst.puffs, vec![ByteExtent::new(0, 11)]);
        assert_eq!(header.dst.puff_length, 11);
        assert!(payload.starts_with(b"BSDIFF40"));
    }

    #[test]
    fn nonzero_trailing_bits_in_destination_fail() {
        // Bits 50..56 follow the final block and are not part of the stream.
        let mut dst = FIXED_12345.to_vec();
        dst[6] = 0xFC;
        let err = puff_diff(
            &FIXED_12345,
            &dst,
            &[BitExtent::new(0, 50)],
            &[BitExtent::new(0, 50)],
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        // The same bits in the source are harmless: the source is only puffed.
        let patch = puff_diff(
            &dst,
            &FIXED_12345,
            &[BitExtent::new(0, 50)],
            &[BitExtent::new(0, 50)],
            &DiffOptions::default(),
        )
        .unwrap();
        assert_eq!(
            crate::patch::puff_patch(&dst, &patch, &Default::default()).unwrap(),
            FIXED_12345
        );
    }

    #[test]
    fn bad_deflate_extent_fails() {
        let err = puff_diff(
            b"not deflate at all",
            b"",
            &[BitExtent::new(0, 40)],
            &[],
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
