// Deflate discovery inside container formats.
//
// Containers are located in two passes. The first finds the byte extent of
// each deflate body (zlib framing, gzip members, zip local entries). For gzip
// and zip the body length is not stored reliably up front, so a throwaway
// raw inflate measures how many bytes the body really occupies. The second
// pass splits every body into its deflate blocks by puffing it in counting
// mode with extent recording on.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use flate2::{Decompress, FlushDecompress, Status};
use log::{debug, warn};

use crate::bits::{BitReader, Output};
use crate::error::{Result, insufficient_input, invalid};
use crate::extent::{BitExtent, ByteExtent, total_length, validate_deflates};
use crate::puff::{PuffWriter, Puffer};
use crate::stream::Stream;

// ---------------------------------------------------------------------------
// Container formats
// ---------------------------------------------------------------------------

/// Container wrapping the deflate data of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerFormat {
    /// The whole file is one raw deflate stream.
    #[default]
    Raw,
    Zlib,
    Gzip,
    Zip,
}

impl FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "deflate" => Ok(Self::Raw),
            "zlib" => Ok(Self::Zlib),
            "gzip" | "gz" => Ok(Self::Gzip),
            "zip" => Ok(Self::Zip),
            _ => Err(format!("unknown container format '{s}' (raw, zlib, gzip, zip)")),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "raw",
            Self::Zlib => "zlib",
            Self::Gzip => "gzip",
            Self::Zip => "zip",
        })
    }
}

/// Byte extents of the deflate bodies in `data`.
pub fn locate_deflate_bodies(data: &[u8], format: ContainerFormat) -> Result<Vec<ByteExtent>> {
    match format {
        ContainerFormat::Raw => Ok(vec![ByteExtent::new(0, data.len() as u64)]),
        ContainerFormat::Zlib => locate_deflates_in_zlib(data).map(|e| vec![e]),
        ContainerFormat::Gzip => locate_deflates_in_gzip(data),
        ContainerFormat::Zip => locate_deflates_in_zip_archive(data),
    }
}

/// Bit extents of every deflate block in `data`.
pub fn locate_deflates(data: &[u8], format: ContainerFormat) -> Result<Vec<BitExtent>> {
    let bodies = locate_deflate_bodies(data, format)?;
    let blocks = locate_deflate_sub_blocks(data, &bodies)?;
    debug!(
        "{format}: {} deflate bodies, {} blocks",
        bodies.len(),
        blocks.len()
    );
    Ok(blocks)
}

// ---------------------------------------------------------------------------
// zlib (RFC 1950)
// ---------------------------------------------------------------------------

const ZLIB_TRAILER_LEN: u64 = 4;

/// Deflate body of a single zlib stream occupying all of `data`.
pub fn locate_deflates_in_zlib(data: &[u8]) -> Result<ByteExtent> {
    if data.len() < 2 {
        return Err(insufficient_input("zlib header needs 2 bytes"));
    }
    let (cmf, flg) = (data[0], data[1]);
    if cmf & 0x0F != 8 || cmf >> 4 > 7 {
        return Err(invalid(format!("zlib compression method byte {cmf:#04x}")));
    }
    if (u16::from(cmf) << 8 | u16::from(flg)) % 31 != 0 {
        return Err(invalid("zlib header check bits"));
    }
    // FDICT adds a 4-byte preset dictionary id.
    let header_len: u64 = if flg & 0x20 != 0 { 6 } else { 2 };
    let size = data.len() as u64;
    if size < header_len + ZLIB_TRAILER_LEN {
        return Err(insufficient_input(format!("{size}-byte zlib stream")));
    }
    Ok(ByteExtent::new(header_len, size - header_len - ZLIB_TRAILER_LEN))
}

/// Deflate blocks of several zlib streams embedded in `data`, each given by
/// its byte extent.
pub fn locate_deflates_in_zlib_blocks(
    data: &[u8],
    zlibs: &[ByteExtent],
) -> Result<Vec<BitExtent>> {
    let mut blocks = Vec::new();
    for zlib in zlibs {
        let window = slice(data, *zlib)?;
        let body = locate_deflates_in_zlib(window)?;
        let body = ByteExtent::new(zlib.offset + body.offset, body.length);
        blocks.extend(find_deflate_sub_blocks(data, body)?);
    }
    Ok(blocks)
}

// ---------------------------------------------------------------------------
// gzip (RFC 1952)
// ---------------------------------------------------------------------------

const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];
const GZIP_HEADER_LEN: usize = 10;
const GZIP_TRAILER_LEN: usize = 8;

bitflags! {
    /// Gzip member header FLG byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GzipFlags: u8 {
        const FTEXT = 0b0000_0001;
        const FHCRC = 0b0000_0010;
        const FEXTRA = 0b0000_0100;
        const FNAME = 0b0000_1000;
        const FCOMMENT = 0b0001_0000;
    }
}

/// Deflate bodies of every member of a gzip file.
///
/// Bytes after the last member that do not start another member are
/// ignored with a warning.
pub fn locate_deflates_in_gzip(data: &[u8]) -> Result<Vec<ByteExtent>> {
    let mut bodies = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if !data[pos..].starts_with(&GZIP_MAGIC) {
            if bodies.is_empty() {
                return Err(invalid("missing gzip magic"));
            }
            warn!(
                "ignoring {} trailing bytes after gzip member at {pos}",
                data.len() - pos
            );
            break;
        }
        if data.len() - pos < GZIP_HEADER_LEN {
            return Err(insufficient_input("truncated gzip header"));
        }
        let flags = GzipFlags::from_bits(data[pos + 3])
            .ok_or_else(|| invalid(format!("reserved gzip flags {:#04x}", data[pos + 3])))?;
        let mut cursor = pos + GZIP_HEADER_LEN;

        if flags.contains(GzipFlags::FEXTRA) {
            let xlen = u16::from_le_bytes(array_at(data, cursor)?) as usize;
            cursor = skip(data, cursor + 2, xlen)?;
        }
        if flags.contains(GzipFlags::FNAME) {
            cursor = skip_zero_terminated(data, cursor)?;
        }
        if flags.contains(GzipFlags::FCOMMENT) {
            cursor = skip_zero_terminated(data, cursor)?;
        }
        if flags.contains(GzipFlags::FHCRC) {
            cursor = skip(data, cursor, 2)?;
        }

        let (consumed, inflated) = probe_inflate(&data[cursor..])?;
        bodies.push(ByteExtent::new(cursor as u64, consumed));
        cursor += consumed as usize;

        let trailer: [u8; GZIP_TRAILER_LEN] = array_at(data, cursor)?;
        let declared = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        if declared != inflated as u32 {
            return Err(invalid(format!(
                "gzip member at {pos} declares {declared} bytes but inflates to {inflated}"
            )));
        }
        pos = cursor + GZIP_TRAILER_LEN;
    }
    debug!("gzip: {} members", bodies.len());
    Ok(bodies)
}

// ---------------------------------------------------------------------------
// zip (PKWARE APPNOTE, local file headers only)
// ---------------------------------------------------------------------------

const ZIP_LOCAL_HEADER_MAGIC: u32 = 0x0403_4B50;
const ZIP_LOCAL_HEADER_LEN: usize = 30;
const ZIP_METHOD_DEFLATE: u16 = 8;

/// Deflate bodies of every deflate-compressed local entry in a zip archive.
///
/// The archive is scanned for local header signatures rather than walked
/// through the central directory, so entries are found even in truncated or
/// concatenated archives. A signature whose entry does not inflate is taken
/// as a false positive and skipped.
pub fn locate_deflates_in_zip_archive(data: &[u8]) -> Result<Vec<ByteExtent>> {
    let mut bodies = Vec::new();
    let mut pos = 0usize;
    while pos + ZIP_LOCAL_HEADER_LEN <= data.len() {
        if u32::from_le_bytes(array_at(data, pos)?) != ZIP_LOCAL_HEADER_MAGIC {
            pos += 1;
            continue;
        }
        let method = u16::from_le_bytes(array_at(data, pos + 8)?);
        if method != ZIP_METHOD_DEFLATE {
            pos += 4;
            continue;
        }
        let compressed = u32::from_le_bytes(array_at(data, pos + 18)?);
        let uncompressed = u32::from_le_bytes(array_at(data, pos + 22)?);
        let name_len = u16::from_le_bytes(array_at(data, pos + 26)?) as usize;
        let extra_len = u16::from_le_bytes(array_at(data, pos + 28)?) as usize;
        let start = pos + ZIP_LOCAL_HEADER_LEN + name_len + extra_len;
        if start > data.len() {
            warn!("zip local header at {pos} runs past end of archive");
            pos += 4;
            continue;
        }

        let (consumed, inflated) = match probe_inflate(&data[start..]) {
            Ok(found) => found,
            Err(e) => {
                warn!("zip signature at {pos} is not a deflate entry: {e}");
                pos += 4;
                continue;
            }
        };
        // Entries written with a data descriptor carry zero sizes here.
        if u64::from(compressed) != consumed || u64::from(uncompressed) != inflated {
            warn!(
                "zip entry at {pos} declares {compressed}/{uncompressed} bytes, \
                 found {consumed}/{inflated}"
            );
        }
        bodies.push(ByteExtent::new(start as u64, consumed));
        pos = start + consumed as usize;
    }
    debug!("zip: {} deflate entries", bodies.len());
    Ok(bodies)
}

// ---------------------------------------------------------------------------
// Block-level refinement
// ---------------------------------------------------------------------------

/// Bit extents of the deflate blocks in the body at `body`.
pub fn find_deflate_sub_blocks(data: &[u8], body: ByteExtent) -> Result<Vec<BitExtent>> {
    slice(data, body)?;
    let mut br = BitReader::with_range(data, body.offset * 8, body.length * 8);
    let mut pw = PuffWriter::new(Output::Counting);
    let mut blocks = Vec::new();
    Puffer::new().puff_deflate(&mut br, &mut pw, Some(&mut blocks))?;
    Ok(blocks)
}

/// Bit extents of the deflate blocks in every body.
pub fn locate_deflate_sub_blocks(data: &[u8], bodies: &[ByteExtent]) -> Result<Vec<BitExtent>> {
    let mut blocks = Vec::new();
    for body in bodies {
        blocks.extend(find_deflate_sub_blocks(data, *body)?);
    }
    Ok(blocks)
}

/// Puff-space extent of every deflate in `stream`, and the total size of the
/// puffed stream.
///
/// Puffs are laid out so that every byte outside a deflate keeps its
/// distance to the neighbouring deflates, which is the layout
/// `PuffinStream` expects.
pub fn find_puff_locations<S: Stream + ?Sized>(
    stream: &mut S,
    deflates: &[BitExtent],
) -> Result<(Vec<ByteExtent>, u64)> {
    validate_deflates(deflates)?;
    let mut puffer = Puffer::new();
    let mut puffs = Vec::with_capacity(deflates.len());
    let mut raw_pos = 0u64;
    let mut puff_pos = 0u64;
    let mut raw = Vec::new();
    let size = stream.size()?;
    for (i, d) in deflates.iter().enumerate() {
        let span = d.byte_span();
        if span.end() > size {
            return Err(insufficient_input(format!(
                "deflate #{i} ({d}) ends past the {size}-byte stream"
            )));
        }
        raw.resize(span.length as usize, 0);
        stream.seek(span.offset)?;
        stream.read(&mut raw)?;

        let mut br = BitReader::with_range(&raw, d.offset - span.offset * 8, d.length);
        let mut pw = PuffWriter::new(Output::Counting);
        puffer.puff_deflate(&mut br, &mut pw, None)?;
        debug!("deflate #{i} ({d}) puffs to {} bytes", pw.size());

        // A block sharing its first byte with the previous one has no gap.
        let gap = span.offset.saturating_sub(raw_pos);
        let puff = ByteExtent::new(puff_pos + gap, pw.size() as u64);
        puffs.push(puff);
        raw_pos = span.end();
        puff_pos = puff.end();
    }
    let puff_size = puff_pos + (size - raw_pos);
    debug!(
        "{} deflates puff to {} bytes of {puff_size}",
        deflates.len(),
        total_length(&puffs)
    );
    Ok((puffs, puff_size))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Inflate a raw deflate stream at the start of `data`, discarding the
/// output. Returns (compressed bytes consumed, decompressed length).
fn probe_inflate(data: &[u8]) -> Result<(u64, u64)> {
    let mut inflater = Decompress::new(false);
    let mut scratch = vec![0u8; 32 * 1024];
    loop {
        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress(&data[before_in as usize..], &mut scratch, FlushDecompress::None)
            .map_err(|e| invalid(format!("deflate body does not inflate: {e}")))?;
        if status == Status::StreamEnd {
            return Ok((inflater.total_in(), inflater.total_out()));
        }
        if inflater.total_in() == before_in && inflater.total_out() == before_out {
            return Err(insufficient_input("deflate body is truncated"));
        }
    }
}

fn slice(data: &[u8], extent: ByteExtent) -> Result<&[u8]> {
    data.get(extent.offset as usize..extent.end() as usize)
        .ok_or_else(|| {
            insufficient_input(format!(
                "extent {extent} is outside the {}-byte input",
                data.len()
            ))
        })
}

fn array_at<const N: usize>(data: &[u8], pos: usize) -> Result<[u8; N]> {
    data.get(pos..pos + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| insufficient_input(format!("need {N} bytes at {pos}")))
}

fn skip(data: &[u8], pos: usize, len: usize) -> Result<usize> {
    if pos + len > data.len() {
        return Err(insufficient_input(format!("need {len} bytes at {pos}")));
    }
    Ok(pos + len)
}

fn skip_zero_terminated(data: &[u8], pos: usize) -> Result<usize> {
    data.get(pos..)
        .and_then(|rest| rest.iter().position(|&b| b == 0))
        .map(|n| pos + n + 1)
        .ok_or_else(|| insufficient_input(format!("unterminated gzip string at {pos}")))
}
