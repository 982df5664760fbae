// Patch application.

use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, info};

use super::bspatch::{bspatch, bsdiff_new_size};
use super::header::{StreamInfo, read_patch};
use crate::error::{Result, invalid};
use crate::extent::{ByteExtent, extents_overlap};
use crate::puffin_stream::{DEFAULT_MAX_CACHE_SIZE, PuffinStream};
use crate::stream::{BufferedStream, ExtentStream, FileStream, MemoryStream, SinkStream, Stream};

/// Tuning for patch application.
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Upper bound on puffed source bytes kept in memory.
    pub max_cache_size: usize,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

/// Apply `patch` to `src`, writing the result to `dst`. Both streams are
/// closed on success. Returns the number of puff bytes produced.
pub fn puff_patch_streams<S, D>(src: S, dst: D, patch: &[u8], options: &PatchOptions) -> Result<u64>
where
    S: Stream,
    D: Stream,
{
    let (header, payload) = read_patch(patch)?;
    debug!(
        "patch header: source {} deflates / {} puff bytes, destination {} deflates / {} puff bytes",
        header.src.deflates.len(),
        header.src.puff_length,
        header.dst.deflates.len(),
        header.dst.puff_length
    );
    let new_size = bsdiff_new_size(payload)?;
    if new_size != header.dst.puff_length {
        return Err(invalid(format!(
            "bsdiff payload builds {new_size} bytes, header expects {}",
            header.dst.puff_length
        )));
    }

    let mut old = PuffinStream::create_for_puff(
        src,
        header.src.deflates,
        header.src.puffs,
        header.src.puff_length,
        options.max_cache_size,
    )?;
    let mut new = PuffinStream::create_for_huff(
        dst,
        header.dst.deflates,
        header.dst.puffs,
        header.dst.puff_length,
    )?;
    let written = bspatch(&mut old, &mut new, payload)?;
    new.close()?;
    old.close()?;
    info!("applied patch: {written} puff bytes");
    Ok(written)
}

/// Apply `patch` to an in-memory source file.
pub fn puff_patch(src: &[u8], patch: &[u8], options: &PatchOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    puff_patch_streams(
        MemoryStream::for_read(src),
        MemoryStream::for_write(&mut out),
        patch,
        options,
    )?;
    Ok(out)
}

/// Apply `patch` to an in-memory source file, streaming the result into
/// `out` as it is produced.
pub fn puff_patch_to_writer<W: Write>(
    src: &[u8],
    patch: &[u8],
    out: &mut W,
    options: &PatchOptions,
) -> Result<u64> {
    let sink = SinkStream::new(|buf: &[u8]| out.write_all(buf));
    puff_patch_streams(MemoryStream::for_read(src), sink, patch, options)
}

/// Apply `patch` to the file at `src`, writing to `dst`.
///
/// Either side may be restricted to a list of byte extents, for example
/// the blocks of a partition image. When both sides denote the same storage
/// and their extents overlap, the output is buffered in memory and written
/// only after the whole source has been read.
pub fn patch_file(
    src: &Path,
    dst: &Path,
    src_extents: Option<&[ByteExtent]>,
    dst_extents: Option<&[ByteExtent]>,
    patch: &[u8],
    options: &PatchOptions,
) -> Result<u64> {
    let overlap = same_file(src, dst)?
        && match (src_extents, dst_extents) {
            (Some(a), Some(b)) => extents_overlap(a, b),
            _ => true,
        };

    let src_stream: Box<dyn Stream> = match src_extents {
        Some(extents) => Box::new(ExtentStream::for_read(
            FileStream::open(src)?,
            extents.to_vec(),
        )?),
        None => Box::new(FileStream::open(src)?),
    };

    let dst_file = if overlap || dst_extents.is_some() {
        FileStream::open_for_write(dst)?
    } else {
        FileStream::create(dst)?
    };
    let dst_stream: Box<dyn Stream> = match dst_extents {
        Some(extents) => Box::new(ExtentStream::for_write(dst_file, extents.to_vec())?),
        None => Box::new(dst_file),
    };
    let dst_stream: Box<dyn Stream> = if overlap {
        debug!(
            "{} and {} overlap, buffering output",
            src.display(),
            dst.display()
        );
        Box::new(BufferedStream::new(dst_stream))
    } else {
        dst_stream
    };

    let written = puff_patch_streams(src_stream, dst_stream, patch, options)?;

    // A whole-file destination may have held a longer file before.
    if dst_extents.is_none() {
        let (header, _) = read_patch(patch)?;
        fs::OpenOptions::new()
            .write(true)
            .open(dst)?
            .set_len(output_size(&header.dst))?;
    }
    Ok(written)
}

/// Size of the deflate-space file described by `info`.
fn output_size(info: &StreamInfo) -> u64 {
    match (info.deflates.last(), info.puffs.last()) {
        (Some(d), Some(p)) => d.end_byte() + info.puff_length.saturating_sub(p.end()),
        _ => info.puff_length,
    }
}

/// True if both paths name the same existing file.
fn same_file(a: &Path, b: &Path) -> Result<bool> {
    let Ok(meta_b) = fs::metadata(b) else {
        return Ok(false);
    };
    let meta_a = fs::metadata(a)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(meta_a.dev() == meta_b.dev() && meta_a.ino() == meta_b.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = (meta_a, meta_b);
        Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
    }
}
