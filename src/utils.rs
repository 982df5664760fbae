// Whole-buffer conveniences over `PuffinStream`.

use log::debug;

use crate::error::Result;
use crate::extent::{BitExtent, ByteExtent};
use crate::locate::find_puff_locations;
use crate::puffin_stream::{DEFAULT_MAX_CACHE_SIZE, PuffinStream};
use crate::stream::{MemoryStream, Stream, read_all};

/// Puff every deflate of `data` at `deflates`, returning the whole puffed
/// file: bytes outside the deflates are carried over unchanged.
pub fn puff(data: &[u8], deflates: &[BitExtent]) -> Result<Vec<u8>> {
    let mut src = MemoryStream::for_read(data);
    let (puffs, puff_size) = find_puff_locations(&mut src, deflates)?;
    let mut puffin = PuffinStream::create_for_puff(
        src,
        deflates.to_vec(),
        puffs,
        puff_size,
        DEFAULT_MAX_CACHE_SIZE,
    )?;
    read_all(&mut puffin)
}

/// Inverse of [`puff`]. `puffs` are the puff-space extents matching
/// `deflates` index for index, as returned by
/// [`find_puff_locations`](crate::locate::find_puff_locations); a single
/// deflate extent may hold several blocks, so they cannot be recovered from
/// the deflate extents alone.
pub fn huff(puffed: &[u8], deflates: &[BitExtent], puffs: &[ByteExtent]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut puffin = PuffinStream::create_for_huff(
        MemoryStream::for_write(&mut out),
        deflates.to_vec(),
        puffs.to_vec(),
        puffed.len() as u64,
    )?;
    puffin.write(puffed)?;
    puffin.close()?;
    Ok(out)
}

/// Puff `data` and huff it back. True when the result is bit-identical.
pub fn puff_huff_verify(data: &[u8], deflates: &[BitExtent]) -> Result<bool> {
    let (puffs, _) = find_puff_locations(&mut MemoryStream::for_read(data), deflates)?;
    let puffed = puff(data, deflates)?;
    let huffed = huff(&puffed, deflates, &puffs)?;
    debug!(
        "puff/huff: {} -> {} -> {} bytes",
        data.len(),
        puffed.len(),
        huffed.len()
    );
    Ok(huffed == data)
}
