// Extent-backed stream.
//
// Presents an ordered list of disjoint byte ranges of an underlying stream as
// one contiguous address space. Reads and writes that cross an extent
// boundary are split into several underlying operations.

use super::Stream;
use crate::error::{Result, insufficient_input, invalid, unsupported};
use crate::extent::ByteExtent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

pub struct ExtentStream<S: Stream> {
    inner: S,
    extents: Vec<ByteExtent>,
    /// Logical end offset of each extent (cumulative lengths).
    ends: Vec<u64>,
    offset: u64,
    mode: Mode,
}

impl<S: Stream> ExtentStream<S> {
    pub fn for_read(inner: S, extents: Vec<ByteExtent>) -> Result<Self> {
        Self::new(inner, extents, Mode::Read)
    }

    pub fn for_write(inner: S, extents: Vec<ByteExtent>) -> Result<Self> {
        Self::new(inner, extents, Mode::Write)
    }

    fn new(inner: S, extents: Vec<ByteExtent>, mode: Mode) -> Result<Self> {
        let mut total = 0u64;
        let mut ends = Vec::with_capacity(extents.len());
        for e in &extents {
            if e.offset.checked_add(e.length).is_none() {
                return Err(invalid(format!("stream extent {e} overflows")));
            }
            total = total
                .checked_add(e.length)
                .ok_or_else(|| invalid("stream extents overflow in total length"))?;
            ends.push(total);
        }

        let mut sorted: Vec<&ByteExtent> = extents.iter().collect();
        sorted.sort();
        if sorted.windows(2).any(|w| w[0].overlaps(w[1])) {
            return Err(invalid("stream extents overlap"));
        }

        Ok(Self {
            inner,
            extents,
            ends,
            offset: 0,
            mode,
        })
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn total(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Index of the extent holding logical `offset`, with the position inside
    /// that extent.
    fn locate(&self, offset: u64) -> (usize, u64) {
        let idx = self.ends.partition_point(|&end| end <= offset);
        let start = self.ends[idx] - self.extents[idx].length;
        (idx, offset - start)
    }

    /// Walk the extents covering `[offset, offset + len)`, calling `f` with
    /// the underlying absolute position and chunk length.
    fn for_each_chunk(
        &mut self,
        len: usize,
        mut f: impl FnMut(&mut S, u64, std::ops::Range<usize>) -> Result<()>,
    ) -> Result<()> {
        if self.offset + len as u64 > self.total() {
            return Err(insufficient_input(format!(
                "{len} bytes at {} runs past extent stream end {}",
                self.offset,
                self.total()
            )));
        }
        let mut done = 0usize;
        while done < len {
            let (idx, within) = self.locate(self.offset);
            let extent = self.extents[idx];
            let chunk = ((extent.length - within) as usize).min(len - done);
            f(&mut self.inner, extent.offset + within, done..done + chunk)?;
            done += chunk;
            self.offset += chunk as u64;
        }
        Ok(())
    }
}

impl<S: Stream> Stream for ExtentStream<S> {
    fn size(&self) -> Result<u64> {
        Ok(self.total())
    }

    fn offset(&self) -> Result<u64> {
        Ok(self.offset)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.total() {
            return Err(invalid(format!(
                "seek to {offset} past extent stream end {}",
                self.total()
            )));
        }
        self.offset = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.mode != Mode::Read {
            return Err(unsupported("read from extent stream opened for write"));
        }
        self.for_each_chunk(buf.len(), |inner, pos, range| {
            if inner.offset()? != pos {
                inner.seek(pos)?;
            }
            inner.read(&mut buf[range])
        })
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.mode != Mode::Write {
            return Err(unsupported("write to extent stream opened for read"));
        }
        self.for_each_chunk(buf.len(), |inner, pos, range| {
            if inner.offset()? != pos {
                inner.seek(pos)?;
            }
            inner.write(&buf[range])
        })
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stream::MemoryStream;

    #[test]
    fn read_crosses_extent_boundaries() {
        let data: Vec<u8> = (0u8..32).collect();
        let extents = vec![
            ByteExtent::new(20, 4),
            ByteExtent::new(2, 3),
            ByteExtent::new(10, 0),
            ByteExtent::new(28, 4),
        ];
        let mut s = ExtentStream::for_read(MemoryStream::for_read(&data), extents).unwrap();
        assert_eq!(s.size().unwrap(), 11);

        let mut buf = [0u8; 11];
        s.read(&mut buf).unwrap();
        assert_eq!(buf, [20, 21, 22, 23, 2, 3, 4, 28, 29, 30, 31]);

        s.seek(3).unwrap();
        let mut buf = [0u8; 3];
        s.read(&mut buf).unwrap();
        assert_eq!(buf, [23, 2, 3]);
    }

    #[test]
    fn overflowing_extents_are_invalid() {
        let data = [0u8; 4];
        let extents = vec![ByteExtent::new(0, u64::MAX), ByteExtent::new(0, 1)];
        let err = ExtentStream::for_read(MemoryStream::for_read(&data), extents)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let extents = vec![ByteExtent::new(u64::MAX, 1)];
        let err = ExtentStream::for_read(MemoryStream::for_read(&data), extents)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn write_scatters_into_extents() {
        let mut data = vec![0u8; 10];
        {
            let extents = vec![ByteExtent::new(8, 2), ByteExtent::new(1, 3)];
            let mut s =
                ExtentStream::for_write(MemoryStream::for_write(&mut data), extents).unwrap();
            s.write(b"abcde").unwrap();
            assert!(s.write(b"f").is_err());
            s.close().unwrap();
        }
        assert_eq!(data, b"\0cde\0\0\0\0ab");
    }

    #[test]
    fn rejects_overlap_and_wrong_mode() {
        let data = [0u8; 8];
        assert!(
            ExtentStream::for_read(
                MemoryStream::for_read(&data),
                vec![ByteExtent::new(0, 4), ByteExtent::new(3, 2)]
            )
            .is_err()
        );
        let mut s =
            ExtentStream::for_read(MemoryStream::for_read(&data), vec![ByteExtent::new(0, 4)])
                .unwrap();
        assert!(s.write(b"x").is_err());
        assert!(s.seek(5).is_err());
    }
}
