// bsdiff 4.x patch interpreter over `Stream`s.
//
// A BSDIFF40 payload is a 32-byte header (magic, compressed control length,
// compressed diff length, new size) followed by three bzip2 streams:
// control triples, diff bytes and extra bytes. Integers are 64-bit
// little-endian sign-magnitude.
//
// The interpreter only needs `seek`/`read` on the old stream and sequential
// `write` on the new one, so it runs unchanged over plain buffers or over
// puffin streams that transcode on the fly.

use std::io::{self, Read};

use bzip2::read::BzDecoder;
use log::trace;

use crate::error::{Error, Result, insufficient_input, invalid};
use crate::stream::Stream;

pub const BSDIFF_MAGIC: &[u8; 8] = b"BSDIFF40";
const HEADER_LEN: usize = 32;
const BUFFER_SIZE: usize = 16384;

/// One control record: add `diff_size` diff bytes onto old bytes, copy
/// `extra_size` extra bytes, then move the old cursor by `offset_increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEntry {
    pub diff_size: u64,
    pub extra_size: u64,
    pub offset_increment: i64,
}

/// Decode a sign-magnitude 64-bit integer.
#[inline]
pub fn decode_int(b: &[u8; 8]) -> i64 {
    let x = u64::from_le_bytes(*b);
    if x >> 63 == 0 || x == 0x8000_0000_0000_0000 {
        x as i64
    } else {
        ((x & 0x7FFF_FFFF_FFFF_FFFF) as i64).wrapping_neg()
    }
}

struct PatchStreams<'a> {
    new_size: u64,
    ctrls: BzDecoder<&'a [u8]>,
    diff: BzDecoder<&'a [u8]>,
    extra: BzDecoder<&'a [u8]>,
}

fn parse(payload: &[u8]) -> Result<PatchStreams<'_>> {
    if payload.len() < HEADER_LEN {
        return Err(insufficient_input(format!(
            "{}-byte bsdiff payload",
            payload.len()
        )));
    }
    if &payload[..8] != BSDIFF_MAGIC {
        return Err(invalid("bad bsdiff magic"));
    }
    let field = |i: usize| -> Result<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(&payload[8 * i..8 * i + 8]);
        u64::try_from(decode_int(&b)).map_err(|_| invalid("negative size in bsdiff header"))
    };
    let (csize, dsize, new_size) = (field(1)?, field(2)?, field(3)?);
    let body = &payload[HEADER_LEN..];
    if csize.saturating_add(dsize) > body.len() as u64 {
        return Err(invalid("bsdiff stream lengths exceed the payload"));
    }
    let (ctrls, rest) = body.split_at(csize as usize);
    let (diff, extra) = rest.split_at(dsize as usize);
    Ok(PatchStreams {
        new_size,
        ctrls: BzDecoder::new(ctrls),
        diff: BzDecoder::new(diff),
        extra: BzDecoder::new(extra),
    })
}

/// The new-file size recorded in a bsdiff payload.
pub fn bsdiff_new_size(payload: &[u8]) -> Result<u64> {
    parse(payload).map(|p| p.new_size)
}

fn stream_error(what: &'static str) -> impl Fn(io::Error) -> Error {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            insufficient_input(format!("bsdiff {what} stream ends early"))
        } else {
            invalid(format!("bsdiff {what} stream: {e}"))
        }
    }
}

/// Read the next control triple, or `None` at a clean end of stream.
fn next_control<R: Read>(r: &mut R) -> Result<Option<ControlEntry>> {
    let mut ctl = [0u8; 24];
    let mut filled = 0;
    while filled < ctl.len() {
        match r.read(&mut ctl[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(stream_error("control")(e)),
        }
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled != ctl.len() {
        return Err(insufficient_input("truncated bsdiff control entry"));
    }
    let int = |i: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&ctl[8 * i..8 * i + 8]);
        decode_int(&b)
    };
    let (diff, extra) = (int(0), int(1));
    if diff < 0 || extra < 0 {
        return Err(invalid("negative length in bsdiff control entry"));
    }
    Ok(Some(ControlEntry {
        diff_size: diff as u64,
        extra_size: extra as u64,
        offset_increment: int(2),
    }))
}

/// Apply a BSDIFF40 `payload` to `old`, writing the result to `new`.
///
/// Old reads are clamped to the old stream: diff bytes that land before its
/// start or past its end are copied through unchanged. Returns the number of
/// bytes written, which always equals the size recorded in the payload.
pub fn bspatch<O, N>(old: &mut O, new: &mut N, payload: &[u8]) -> Result<u64>
where
    O: Stream + ?Sized,
    N: Stream + ?Sized,
{
    let PatchStreams {
        new_size,
        mut ctrls,
        mut diff,
        mut extra,
    } = parse(payload)?;
    let old_size = old.size()? as i64;
    let mut old_pos: i64 = 0;
    let mut written: u64 = 0;
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut dlt = vec![0u8; BUFFER_SIZE];
    let mut old_bytes = vec![0u8; BUFFER_SIZE];

    while let Some(ctrl) = next_control(&mut ctrls)? {
        trace!(
            "bspatch control: diff {} extra {} seek {} at old {old_pos} new {written}",
            ctrl.diff_size, ctrl.extra_size, ctrl.offset_increment
        );
        if ctrl.diff_size > new_size - written {
            return Err(invalid(format!(
                "bsdiff control writes past the {new_size}-byte new file"
            )));
        }
        let mut left = ctrl.diff_size;
        while left > 0 {
            let k = left.min(BUFFER_SIZE as u64) as usize;
            diff.read_exact(&mut dlt[..k]).map_err(stream_error("diff"))?;
            buf[..k].copy_from_slice(&dlt[..k]);

            let start = old_pos;
            let end = old_pos.saturating_add(k as i64);
            let lo = start.clamp(0, old_size);
            let hi = end.clamp(0, old_size);
            if lo < hi {
                let (a, b) = ((lo - start) as usize, (hi - start) as usize);
                if old.offset()? != lo as u64 {
                    old.seek(lo as u64)?;
                }
                old.read(&mut old_bytes[..b - a])?;
                for (out, o) in buf[a..b].iter_mut().zip(&old_bytes[..b - a]) {
                    *out = out.wrapping_add(*o);
                }
            }
            new.write(&buf[..k])?;
            old_pos = end;
            left -= k as u64;
        }
        written += ctrl.diff_size;

        if ctrl.extra_size > new_size - written {
            return Err(invalid(format!(
                "bsdiff extra data writes past the {new_size}-byte new file"
            )));
        }
        let mut left = ctrl.extra_size;
        while left > 0 {
            let k = left.min(BUFFER_SIZE as u64) as usize;
            extra.read_exact(&mut buf[..k]).map_err(stream_error("extra"))?;
            new.write(&buf[..k])?;
            left -= k as u64;
        }
        written += ctrl.extra_size;

        old_pos = old_pos
            .checked_add(ctrl.offset_increment)
            .ok_or_else(|| invalid("bsdiff seek overflows"))?;
    }

    if written != new_size {
        return Err(invalid(format!(
            "bsdiff patch produced {written} of {new_size} bytes"
        )));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stream::MemoryStream;

    fn diff(old: &[u8], new: &[u8]) -> Vec<u8> {
        let mut patch = Vec::new();
        qbsdiff::Bsdiff::new(old, new)
            .compare(io::Cursor::new(&mut patch))
            .unwrap();
        patch
    }

    fn apply(old: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        bspatch(
            &mut MemoryStream::for_read(old),
            &mut MemoryStream::for_write(&mut out),
            payload,
        )?;
        Ok(out)
    }

    #[test]
    fn sign_magnitude_integers() {
        assert_eq!(decode_int(&5u64.to_le_bytes()), 5);
        assert_eq!(decode_int(&(5u64 | 1 << 63).to_le_bytes()), -5);
        assert_eq!(decode_int(&(1u64 << 63).to_le_bytes()), i64::MIN);
    }

    #[test]
    fn applies_qbsdiff_output() {
        let old: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let mut new = old.clone();
        new[100..120].fill(0xAA);
        new.splice(3000..3000, b"inserted bytes".iter().copied());
        new.truncate(4500);

        let payload = diff(&old, &new);
        assert_eq!(bsdiff_new_size(&payload).unwrap(), new.len() as u64);
        assert_eq!(apply(&old, &payload).unwrap(), new);
    }

    #[test]
    fn new_file_larger_than_old() {
        let old = b"?".to_vec();
        let new = b"fresh content, almost nothing to diff against".to_vec();
        let payload = diff(&old, &new);
        assert_eq!(apply(&old, &payload).unwrap(), new);
    }

    #[test]
    fn rejects_corrupt_payloads() {
        let old = vec![7u8; 1000];
        let mut new = old.clone();
        new[500] = 8;
        let payload = diff(&old, &new);

        assert_eq!(
            apply(&old, &payload[..20]).unwrap_err().kind(),
            ErrorKind::InsufficientInput
        );

        let mut bad = payload.clone();
        bad[0] = b'X';
        assert_eq!(apply(&old, &bad).unwrap_err().kind(), ErrorKind::InvalidInput);

        // Shrinking the declared new size trips the running size check.
        let mut short = payload.clone();
        short[24..32].copy_from_slice(&10u64.to_le_bytes());
        assert_eq!(apply(&old, &short).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
