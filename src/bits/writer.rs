// Bit writer producing a deflate bitstream.

use super::Output;
use crate::error::{Result, invalid};

/// Writes deflate fields (LSB-first) into an [`Output`].
///
/// With `Output::Counting` the writer only advances its counters, so
/// `size()` predicts the materialized length exactly.
pub struct BitWriter<'a> {
    out: Output<'a>,
    /// Index of the next whole byte to emit.
    index: usize,
    holder: u64,
    holder_bits: u32,
}

impl<'a> BitWriter<'a> {
    pub fn new(out: Output<'a>) -> Self {
        Self {
            out,
            index: 0,
            holder: 0,
            holder_bits: 0,
        }
    }

    /// Start with `bits` (< 8) already pending in the first byte. Used when a
    /// deflate block begins mid-byte, right after the previous block.
    pub fn with_prefix(out: Output<'a>, bits: u32, value: u8) -> Self {
        debug_assert!(bits < 8);
        Self {
            out,
            index: 0,
            holder: (value as u64) & ((1u64 << bits) - 1),
            holder_bits: bits,
        }
    }

    /// Append the low `n` bits of `value` (n <= 32).
    #[inline]
    pub fn write_bits(&mut self, n: u32, value: u32) -> Result<()> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(());
        }
        self.holder |= ((value as u64) & ((1u64 << n) - 1)) << self.holder_bits;
        self.holder_bits += n;
        while self.holder_bits >= 8 {
            self.out.put(self.index, self.holder as u8)?;
            self.index += 1;
            self.holder >>= 8;
            self.holder_bits -= 8;
        }
        Ok(())
    }

    /// Pad to the next byte boundary with the low bits of `value`.
    pub fn write_boundary_bits(&mut self, value: u8) -> Result<()> {
        let n = (8 - self.holder_bits % 8) % 8;
        self.write_bits(n, value as u32)
    }

    /// Copy whole bytes through. The writer must be byte-aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.holder_bits != 0 {
            return Err(invalid("raw bytes written at a non-byte boundary"));
        }
        self.out.put_slice(self.index, bytes)?;
        self.index += bytes.len();
        Ok(())
    }

    /// Force out a partial trailing byte, zero-padded.
    pub fn flush(&mut self) -> Result<()> {
        if self.holder_bits > 0 {
            self.out.put(self.index, self.holder as u8)?;
            self.index += 1;
            self.holder = 0;
            self.holder_bits = 0;
        }
        Ok(())
    }

    /// Whole bytes emitted so far.
    #[inline]
    pub fn size(&self) -> usize {
        self.index
    }

    /// Total bits written, including any prefix bits.
    #[inline]
    pub fn bits_written(&self) -> u64 {
        self.index as u64 * 8 + self.holder_bits as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitReader;

    #[test]
    fn writes_lsb_first() {
        let mut buf = [0u8; 2];
        let mut w = BitWriter::new(Output::Buffer(&mut buf));
        w.write_bits(1, 0).unwrap();
        w.write_bits(2, 0b10).unwrap();
        w.write_bits(7, 0b1110101).unwrap();
        assert_eq!(w.bits_written(), 10);
        w.flush().unwrap();
        assert_eq!(w.size(), 2);
        assert_eq!(buf, [0b1010_1100, 0b0000_0011]);
    }

    #[test]
    fn boundary_then_bytes() {
        let mut buf = [0u8; 4];
        let mut w = BitWriter::new(Output::Buffer(&mut buf));
        w.write_bits(3, 0b001).unwrap();
        assert!(w.write_bytes(&[1]).is_err());
        w.write_boundary_bits(0b10101).unwrap();
        w.write_bytes(&[0xAA, 0xBB, 0xCC]).unwrap();
        w.flush().unwrap();
        assert_eq!(w.size(), 4);
        assert_eq!(buf, [0b1010_1001, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn counting_matches_materialized_size() {
        let fields = [(3u32, 5u32), (13, 0x1234), (7, 99), (1, 1)];
        let mut counting = BitWriter::new(Output::Counting);
        for &(n, v) in &fields {
            counting.write_bits(n, v).unwrap();
        }
        counting.flush().unwrap();

        let mut buf = vec![0u8; counting.size()];
        let mut real = BitWriter::new(Output::Buffer(&mut buf));
        for &(n, v) in &fields {
            real.write_bits(n, v).unwrap();
        }
        real.flush().unwrap();
        assert_eq!(real.size(), counting.size());

        let mut r = BitReader::new(&buf);
        for &(n, v) in &fields {
            assert_eq!(r.take_bits(n).unwrap(), v & ((1 << n) - 1));
        }
    }

    #[test]
    fn prefix_bits_share_first_byte() {
        let mut buf = [0u8; 1];
        let mut w = BitWriter::with_prefix(Output::Buffer(&mut buf), 3, 0b101);
        w.write_bits(5, 0b11000).unwrap();
        assert_eq!(w.size(), 1);
        assert_eq!(buf, [0b1100_0101]);
    }
}
