// Bit reader over an in-memory deflate stream.

use crate::error::{Result, insufficient_input};

/// Reads deflate fields (LSB-first) from a byte slice.
///
/// The reader may be restricted to a bit range of the slice so that a single
/// deflate block that starts or ends mid-byte can be processed in isolation.
/// `cache_bits` answers "are there n more bits?" without failing; callers turn
/// a `false` into `InsufficientInput`, keeping it distinct from corrupt data.
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit position of the next unread bit.
    position: u64,
    /// One past the last readable bit.
    end: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            end: data.len() as u64 * 8,
        }
    }

    /// Reader over `length` bits of `data` starting at bit `start`.
    pub fn with_range(data: &'a [u8], start: u64, length: u64) -> Self {
        let limit = data.len() as u64 * 8;
        Self {
            data,
            position: start.min(limit),
            end: (start + length).min(limit),
        }
    }

    /// Absolute bit position within the underlying slice.
    #[inline]
    pub fn offset_in_bits(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn bits_remaining(&self) -> u64 {
        self.end.saturating_sub(self.position)
    }

    /// True if at least `n` unread bits remain.
    #[inline]
    pub fn cache_bits(&self, n: u32) -> bool {
        self.bits_remaining() >= n as u64
    }

    /// Peek the next `n` bits (n <= 32), first bit in the least significant
    /// position. Bits past the end of the range read as zero.
    #[inline]
    pub fn read_bits(&self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        if n == 0 {
            return 0;
        }
        let first = (self.position / 8) as usize;
        let shift = (self.position % 8) as u32;
        let mut window = 0u64;
        for (i, &b) in self.data.iter().skip(first).take(5).enumerate() {
            window |= (b as u64) << (8 * i);
        }
        window >>= shift;
        let keep = (n as u64).min(self.bits_remaining());
        (window & ((1u64 << keep) - 1)) as u32
    }

    /// Advance past `n` bits. The caller must have checked `cache_bits(n)`.
    #[inline]
    pub fn drop_bits(&mut self, n: u32) {
        debug_assert!(self.cache_bits(n));
        self.position += n as u64;
    }

    /// Read and consume `n` bits, failing with `InsufficientInput`.
    #[inline]
    pub fn take_bits(&mut self, n: u32) -> Result<u32> {
        if !self.cache_bits(n) {
            return Err(insufficient_input(format!(
                "need {n} bits at bit {}, {} left",
                self.position,
                self.bits_remaining()
            )));
        }
        let v = self.read_bits(n);
        self.drop_bits(n);
        Ok(v)
    }

    /// Number of bits up to the next byte boundary.
    #[inline]
    pub fn boundary_bits(&self) -> u32 {
        ((8 - self.position % 8) % 8) as u32
    }

    /// Value of the bits up to the next byte boundary, without consuming them.
    pub fn read_boundary_bits(&self) -> Result<u8> {
        let n = self.boundary_bits();
        if !self.cache_bits(n) {
            return Err(insufficient_input("boundary bits past end of input"));
        }
        Ok(self.read_bits(n) as u8)
    }

    /// Skip to the next byte boundary, returning how many bits were skipped.
    pub fn skip_boundary_bits(&mut self) -> Result<u32> {
        let n = self.boundary_bits();
        if !self.cache_bits(n) {
            return Err(insufficient_input("boundary bits past end of input"));
        }
        self.drop_bits(n);
        Ok(n)
    }

    /// Borrow the next `len` whole bytes. The reader must be byte-aligned.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.position % 8, 0);
        if self.bits_remaining() < len as u64 * 8 {
            return Err(insufficient_input(format!(
                "need {len} bytes at byte {}, {} bits left",
                self.position / 8,
                self.bits_remaining()
            )));
        }
        let start = (self.position / 8) as usize;
        self.position += len as u64 * 8;
        Ok(&self.data[start..start + len])
    }

    /// Copy bits `[start, end)` of the underlying slice into fresh bytes,
    /// packed LSB-first. The final byte is zero-padded.
    pub fn copy_bits(&self, start: u64, end: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity((end - start).div_ceil(8) as usize);
        let mut r = BitReader::with_range(self.data, start, end - start);
        while r.bits_remaining() > 0 {
            let n = r.bits_remaining().min(8) as u32;
            out.push(r.read_bits(n) as u8);
            r.drop_bits(n);
        }
        out
    }
}
