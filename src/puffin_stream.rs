// PuffinStream: a Stream view of a file with its deflate regions puffed.
//
// The logical (puff-space) address space is the underlying file with every
// deflate extent replaced by its puff. Bytes between deflates (container
// headers, trailers, stored members) map one-to-one onto the file.
//
// In puff mode the stream is read-only and random-access: deflate regions
// are puffed on demand into a bounded cache. In huff mode it is write-only
// and strictly sequential: puff bytes for a region are collected until the
// region is complete, then huffed and written to the file at the region's
// bit extent. A region that ends mid-byte and is followed by a region that
// starts in that same byte holds the byte back so the next region can finish
// it.

use log::debug;

use crate::bits::{BitReader, BitWriter, Output};
use crate::error::{Error, Result, insufficient_input, invalid, unsupported};
use crate::extent::{BitExtent, ByteExtent, shares_first_byte, validate_deflates};
use crate::puff::{Huffer, PuffReader, PuffWriter, Puffer};
use crate::stream::Stream;

/// Default upper bound on cached puff bytes in puff mode.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    /// Maps onto the underlying stream starting at `source`.
    Raw { source: u64 },
    /// The puff of deflate extent `index`.
    Deflate { index: usize },
}

#[derive(Debug, Clone, Copy)]
struct Span {
    puff_offset: u64,
    length: u64,
    segment: Segment,
}

impl Span {
    fn end(&self) -> u64 {
        self.puff_offset + self.length
    }
}

struct CacheEntry {
    index: usize,
    data: Vec<u8>,
    stamp: u64,
}

enum Mode {
    Puff {
        puffer: Puffer,
        cache: Vec<CacheEntry>,
        cache_bytes: usize,
        max_cache_size: usize,
        clock: u64,
    },
    Huff {
        huffer: Huffer,
        pending: Vec<u8>,
        /// Final byte of the previous region when it is shared with the next.
        carry: Option<u8>,
    },
}

pub struct PuffinStream<S: Stream> {
    stream: S,
    deflates: Vec<BitExtent>,
    puffs: Vec<ByteExtent>,
    spans: Vec<Span>,
    puff_size: u64,
    offset: u64,
    mode: Mode,
    closed: bool,
}

impl<S: Stream> PuffinStream<S> {
    /// Read-only puff view of `stream`.
    pub fn create_for_puff(
        stream: S,
        deflates: Vec<BitExtent>,
        puffs: Vec<ByteExtent>,
        puff_size: u64,
        max_cache_size: usize,
    ) -> Result<Self> {
        let spans = build_spans(&deflates, &puffs, puff_size)?;
        let tail = deflates.last().map_or(0, |d| d.end_byte());
        let puff_tail = puffs.last().map_or(0, |p| p.end());
        let size = stream.size()?;
        if size < tail || size - tail != puff_size - puff_tail {
            return Err(invalid(format!(
                "stream of {size} bytes does not match puff size {puff_size}"
            )));
        }
        debug!(
            "puffin stream for puff: {} deflates, puff size {puff_size}, cache {max_cache_size}",
            deflates.len()
        );
        Ok(Self {
            stream,
            deflates,
            puffs,
            spans,
            puff_size,
            offset: 0,
            mode: Mode::Puff {
                puffer: Puffer::new(),
                cache: Vec::new(),
                cache_bytes: 0,
                max_cache_size,
                clock: 0,
            },
            closed: false,
        })
    }

    /// Write-only, sequential huff view of `stream`.
    pub fn create_for_huff(
        stream: S,
        deflates: Vec<BitExtent>,
        puffs: Vec<ByteExtent>,
        puff_size: u64,
    ) -> Result<Self> {
        let spans = build_spans(&deflates, &puffs, puff_size)?;
        debug!(
            "puffin stream for huff: {} deflates, puff size {puff_size}",
            deflates.len()
        );
        Ok(Self {
            stream,
            deflates,
            puffs,
            spans,
            puff_size,
            offset: 0,
            mode: Mode::Huff {
                huffer: Huffer::new(),
                pending: Vec::new(),
                carry: None,
            },
            closed: false,
        })
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn span_at(&self, offset: u64) -> Result<Span> {
        let idx = self.spans.partition_point(|s| s.end() <= offset);
        self.spans
            .get(idx)
            .copied()
            .ok_or_else(|| {
                insufficient_input(format!("offset {offset} past puff size {}", self.puff_size))
            })
    }

    fn seek_inner(&mut self, pos: u64) -> Result<()> {
        if self.stream.offset()? != pos {
            self.stream.seek(pos)?;
        }
        Ok(())
    }

    /// Puff of deflate `index`, from the cache or freshly materialized.
    fn cached_puff(&mut self, index: usize) -> Result<&[u8]> {
        let Mode::Puff {
            puffer,
            cache,
            cache_bytes,
            max_cache_size,
            clock,
        } = &mut self.mode
        else {
            return Err(unsupported("puffing through a huff-mode stream"));
        };

        if let Some(pos) = cache.iter().position(|e| e.index == index) {
            return Ok(&cache[pos].data);
        }

        let deflate = self.deflates[index];
        let span = deflate.byte_span();
        let mut raw = vec![0u8; span.length as usize];
        if self.stream.offset()? != span.offset {
            self.stream.seek(span.offset)?;
        }
        self.stream.read(&mut raw)?;

        let expected = self.puffs[index].length as usize;
        let mut data = vec![0u8; expected];
        let mut br = BitReader::with_range(&raw, deflate.offset - span.offset * 8, deflate.length);
        let mut pw = PuffWriter::new(Output::Buffer(&mut data));
        puffer.puff_deflate(&mut br, &mut pw, None).map_err(|e| match e {
            Error::InsufficientOutput(_) => invalid(format!(
                "deflate #{index} ({deflate}) puffs larger than {expected} bytes"
            )),
            other => other,
        })?;
        let puffed = pw.size();
        if puffed != expected {
            return Err(invalid(format!(
                "deflate #{index} ({deflate}) puffs to {puffed} bytes, expected {expected}"
            )));
        }

        *clock += 1;
        *cache_bytes += data.len();
        cache.push(CacheEntry {
            index,
            data,
            stamp: *clock,
        });
        while *cache_bytes > *max_cache_size && cache.len() > 1 {
            let Some(oldest) = cache
                .iter()
                .enumerate()
                .filter(|(_, e)| e.index != index)
                .min_by_key(|(_, e)| e.stamp)
                .map(|(i, _)| i)
            else {
                break;
            };
            let evicted = cache.swap_remove(oldest);
            *cache_bytes -= evicted.data.len();
            debug!("evicted puff of deflate #{} from cache", evicted.index);
        }

        let pos = cache
            .iter()
            .position(|e| e.index == index)
            .ok_or_else(|| invalid("puff cache lost the current entry"))?;
        Ok(&cache[pos].data)
    }

    /// Huff the completed region `index` and write it out.
    fn flush_region(&mut self, index: usize) -> Result<()> {
        let Mode::Huff {
            huffer,
            pending,
            carry,
        } = &mut self.mode
        else {
            return Err(unsupported("huffing through a puff-mode stream"));
        };

        let deflate = self.deflates[index];
        let span = deflate.byte_span();
        let mut out = vec![0u8; span.length as usize];
        let mut bw = if shares_first_byte(&self.deflates, index) {
            let Some(prefix) = carry.take() else {
                return Err(invalid(format!(
                    "deflate #{index} ({deflate}) starts mid-byte but its predecessor was not written"
                )));
            };
            BitWriter::with_prefix(Output::Buffer(&mut out), (deflate.offset % 8) as u32, prefix)
        } else {
            BitWriter::new(Output::Buffer(&mut out))
        };
        let mut pr = PuffReader::new(pending.as_slice());
        huffer.huff_deflate(&mut pr, &mut bw).map_err(|e| match e {
            Error::InsufficientOutput(_) => invalid(format!(
                "puff #{index} huffs larger than deflate extent {deflate}"
            )),
            other => other,
        })?;
        let huffed = bw.size() as u64;
        if huffed != span.length {
            return Err(invalid(format!(
                "puff #{index} huffs to {huffed} bytes, deflate extent {deflate} spans {}",
                span.length
            )));
        }
        pending.clear();

        let hold_last = index + 1 < self.deflates.len()
            && shares_first_byte(&self.deflates, index + 1);
        let body = if hold_last {
            let (last, body) = out
                .split_last()
                .ok_or_else(|| invalid("empty deflate extent"))?;
            *carry = Some(*last);
            body
        } else {
            &out[..]
        };

        if self.stream.offset()? != span.offset {
            self.stream.seek(span.offset)?;
        }
        self.stream.write(body)
    }
}

/// Size sanity check between a deflate and its puff. A deflate bit yields at
/// most two puff bytes and a puff byte at most two deflate bytes, plus a few
/// bytes of block framing.
fn plausible_pair(d: &BitExtent, p: &ByteExtent) -> bool {
    const SLACK: u64 = 64;
    p.offset.checked_add(p.length).is_some()
        && p.length <= d.length.saturating_mul(4).saturating_add(SLACK)
        && d.byte_span().length <= p.length.saturating_mul(4).saturating_add(SLACK)
}

/// Interleave raw gaps and deflate regions into one sorted span list, and
/// check that every gap has the same length on both sides.
fn build_spans(deflates: &[BitExtent], puffs: &[ByteExtent], puff_size: u64) -> Result<Vec<Span>> {
    if deflates.len() != puffs.len() {
        return Err(invalid(format!(
            "{} deflate extents but {} puff extents",
            deflates.len(),
            puffs.len()
        )));
    }
    validate_deflates(deflates)?;

    let mut spans = Vec::with_capacity(deflates.len() * 2 + 1);
    let mut raw_pos = 0u64;
    let mut puff_pos = 0u64;
    for (i, (d, p)) in deflates.iter().zip(puffs).enumerate() {
        if p.length == 0 {
            return Err(invalid(format!("puff extent #{i} is empty")));
        }
        if !plausible_pair(d, p) {
            return Err(invalid(format!(
                "puff extent #{i} ({p}) cannot be the puff of deflate extent {d}"
            )));
        }
        if p.offset < puff_pos {
            return Err(invalid(format!("puff extent #{i} ({p}) is out of order")));
        }
        let raw_gap = if shares_first_byte(deflates, i) {
            0
        } else {
            d.start_byte()
                .checked_sub(raw_pos)
                .ok_or_else(|| invalid(format!("deflate extent #{i} ({d}) is out of order")))?
        };
        let puff_gap = p.offset - puff_pos;
        if raw_gap != puff_gap {
            return Err(invalid(format!(
                "gap before extent #{i} is {raw_gap} bytes of deflate space but {puff_gap} of puff space"
            )));
        }
        if raw_gap > 0 {
            spans.push(Span {
                puff_offset: puff_pos,
                length: raw_gap,
                segment: Segment::Raw { source: raw_pos },
            });
        }
        spans.push(Span {
            puff_offset: p.offset,
            length: p.length,
            segment: Segment::Deflate { index: i },
        });
        raw_pos = d.end_byte();
        puff_pos = p.end();
    }
    if puff_size < puff_pos {
        return Err(invalid(format!(
            "puff size {puff_size} ends inside puff extent ending at {puff_pos}"
        )));
    }
    if puff_size > puff_pos {
        spans.push(Span {
            puff_offset: puff_pos,
            length: puff_size - puff_pos,
            segment: Segment::Raw { source: raw_pos },
        });
    }
    Ok(spans)
}

impl<S: Stream> Stream for PuffinStream<S> {
    fn size(&self) -> Result<u64> {
        Ok(self.puff_size)
    }

    fn offset(&self) -> Result<u64> {
        Ok(self.offset)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.puff_size {
            return Err(invalid(format!(
                "seek to {offset} past puff size {}",
                self.puff_size
            )));
        }
        if matches!(self.mode, Mode::Huff { .. }) && offset != self.offset {
            return Err(unsupported("huff-mode puffin stream only writes sequentially"));
        }
        self.offset = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if !matches!(self.mode, Mode::Puff { .. }) {
            return Err(unsupported("read from huff-mode puffin stream"));
        }
        if self.offset + buf.len() as u64 > self.puff_size {
            return Err(insufficient_input(format!(
                "read of {} bytes at {} exceeds puff size {}",
                buf.len(),
                self.offset,
                self.puff_size
            )));
        }
        let mut done = 0;
        while done < buf.len() {
            let span = self.span_at(self.offset)?;
            let skip = self.offset - span.puff_offset;
            let n = ((span.length - skip) as usize).min(buf.len() - done);
            match span.segment {
                Segment::Raw { source } => {
                    self.seek_inner(source + skip)?;
                    self.stream.read(&mut buf[done..done + n])?;
                }
                Segment::Deflate { index } => {
                    let data = self.cached_puff(index)?;
                    buf[done..done + n].copy_from_slice(&data[skip as usize..skip as usize + n]);
                }
            }
            done += n;
            self.offset += n as u64;
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if !matches!(self.mode, Mode::Huff { .. }) {
            return Err(unsupported("write to puff-mode puffin stream"));
        }
        if self.closed {
            return Err(invalid("write to closed puffin stream"));
        }
        if self.offset + buf.len() as u64 > self.puff_size {
            return Err(invalid(format!(
                "write of {} bytes at {} exceeds puff size {}",
                buf.len(),
                self.offset,
                self.puff_size
            )));
        }
        let mut done = 0;
        while done < buf.len() {
            let span = self.span_at(self.offset)?;
            let skip = self.offset - span.puff_offset;
            let n = ((span.length - skip) as usize).min(buf.len() - done);
            match span.segment {
                Segment::Raw { source } => {
                    self.seek_inner(source + skip)?;
                    self.stream.write(&buf[done..done + n])?;
                }
                Segment::Deflate { index } => {
                    let Mode::Huff { pending, .. } = &mut self.mode else {
                        return Err(unsupported("write to puff-mode puffin stream"));
                    };
                    pending.extend_from_slice(&buf[done..done + n]);
                    if skip + n as u64 == span.length {
                        self.flush_region(index)?;
                    }
                }
            }
            done += n;
            self.offset += n as u64;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Mode::Huff { pending, .. } = &self.mode
            && !pending.is_empty()
        {
            return Err(invalid(format!(
                "puffin stream closed with {} bytes of an unfinished puff region",
                pending.len()
            )));
        }
        self.stream.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stream::{MemoryStream, read_all};

    const FIXED_12345: [u8; 7] = [0x63, 0x64, 0x62, 0x66, 0x61, 0x05, 0x00];
    const PUFF_12345: [u8; 11] = [0x00, 0x01, 0xA0, 0x04, 1, 2, 3, 4, 5, 0xFF, 0x81];

    fn framed() -> Vec<u8> {
        let mut file = b"HDR!".to_vec();
        file.extend_from_slice(&FIXED_12345);
        file.extend_from_slice(b"TAIL");
        file
    }

    fn framed_puff() -> Vec<u8> {
        let mut puff = b"HDR!".to_vec();
        puff.extend_from_slice(&PUFF_12345);
        puff.extend_from_slice(b"TAIL");
        puff
    }

    #[test]
    fn reads_puffed_view() {
        let file = framed();
        let mut s = PuffinStream::create_for_puff(
            MemoryStream::for_read(&file),
            vec![BitExtent::new(32, 50)],
            vec![ByteExtent::new(4, 11)],
            19,
            DEFAULT_MAX_CACHE_SIZE,
        )
        .unwrap();
        assert_eq!(read_all(&mut s).unwrap(), framed_puff());

        // Random access inside the puffed region.
        let mut two = [0u8; 2];
        s.seek(10).unwrap();
        s.read(&mut two).unwrap();
        assert_eq!(two, [3, 4]);
        assert_eq!(s.read(&mut [0u8; 10]).unwrap_err().kind(), ErrorKind::InsufficientInput);
        assert_eq!(s.write(b"x").unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn writes_huffed_file() {
        let puff = framed_puff();
        let mut out = Vec::new();
        let mut s = PuffinStream::create_for_huff(
            MemoryStream::for_write(&mut out),
            vec![BitExtent::new(32, 50)],
            vec![ByteExtent::new(4, 11)],
            19,
        )
        .unwrap();
        // Odd-sized chunks cross every segment boundary.
        for chunk in puff.chunks(3) {
            s.write(chunk).unwrap();
        }
        s.close().unwrap();
        drop(s);
        assert_eq!(out, framed());
    }

    /// Two fixed blocks of {1..5}; the second starts at bit 50.
    fn two_blocks() -> (Vec<u8>, Vec<u8>) {
        let mut puff = vec![0x00, 0x01, 0x20, 0x04, 1, 2, 3, 4, 5, 0xFF, 0x81];
        puff.extend_from_slice(&PUFF_12345);
        let mut deflate = vec![0u8; 13];
        let mut bw = BitWriter::new(Output::Buffer(&mut deflate));
        Huffer::new()
            .huff_deflate(&mut PuffReader::new(&puff), &mut bw)
            .unwrap();
        (deflate, puff)
    }

    #[test]
    fn shared_byte_between_blocks() {
        let (deflate, puff) = two_blocks();
        let deflates = vec![BitExtent::new(0, 50), BitExtent::new(50, 50)];
        let puffs = vec![ByteExtent::new(0, 11), ByteExtent::new(11, 11)];

        let mut reader = PuffinStream::create_for_puff(
            MemoryStream::for_read(&deflate),
            deflates.clone(),
            puffs.clone(),
            22,
            0,
        )
        .unwrap();
        assert_eq!(read_all(&mut reader).unwrap(), puff);

        let mut out = Vec::new();
        let mut writer =
            PuffinStream::create_for_huff(MemoryStream::for_write(&mut out), deflates, puffs, 22)
                .unwrap();
        writer.write(&puff).unwrap();
        writer.close().unwrap();
        drop(writer);
        assert_eq!(out, deflate);
    }

    #[test]
    fn rejects_inconsistent_gaps() {
        let file = framed();
        let err = PuffinStream::create_for_puff(
            MemoryStream::for_read(&file),
            vec![BitExtent::new(32, 50)],
            vec![ByteExtent::new(5, 11)],
            20,
            DEFAULT_MAX_CACHE_SIZE,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = PuffinStream::create_for_puff(
            MemoryStream::for_read(&file),
            vec![BitExtent::new(32, 50)],
            vec![],
            15,
            DEFAULT_MAX_CACHE_SIZE,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn wrong_puff_length_is_invalid() {
        let file = framed();
        let mut s = PuffinStream::create_for_puff(
            MemoryStream::for_read(&file),
            vec![BitExtent::new(32, 50)],
            vec![ByteExtent::new(4, 12)],
            20,
            DEFAULT_MAX_CACHE_SIZE,
        )
        .unwrap();
        assert_eq!(read_all(&mut s).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn incomplete_region_fails_on_close() {
        let mut out = Vec::new();
        let mut s = PuffinStream::create_for_huff(
            MemoryStream::for_write(&mut out),
            vec![BitExtent::new(32, 50)],
            vec![ByteExtent::new(4, 11)],
            19,
        )
        .unwrap();
        s.write(b"HDR!\x00\x01").unwrap();
        assert!(s.seek(0).is_err());
        assert_eq!(s.close().unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn implausible_puff_sizes_are_rejected() {
        let mut out = Vec::new();
        let err = PuffinStream::create_for_huff(
            MemoryStream::for_write(&mut out),
            vec![BitExtent::new(0, 50)],
            vec![ByteExtent::new(0, 1 << 40)],
            1 << 40,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = PuffinStream::create_for_huff(
            MemoryStream::for_write(&mut out),
            vec![BitExtent::new(0, 1 << 50)],
            vec![ByteExtent::new(0, 11)],
            11,
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
