// Byte and bit extents.
//
// A deflate body inside a container is addressed by a `ByteExtent`; the
// individual deflate blocks inside it need not start on byte boundaries and
// are addressed by `BitExtent`s. Puff regions are always byte-addressed.

use std::fmt;

use crate::error::{Result, invalid};

/// A contiguous byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ByteExtent {
    pub offset: u64,
    pub length: u64,
}

/// A contiguous bit range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BitExtent {
    pub offset: u64,
    pub length: u64,
}

impl ByteExtent {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// The same range expressed in bits.
    pub fn to_bits(self) -> BitExtent {
        BitExtent::new(self.offset * 8, self.length * 8)
    }

    pub fn overlaps(&self, other: &ByteExtent) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

impl BitExtent {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// First byte touched by this extent.
    #[inline]
    pub fn start_byte(&self) -> u64 {
        self.offset / 8
    }

    /// One past the last byte touched by this extent.
    #[inline]
    pub fn end_byte(&self) -> u64 {
        self.end().div_ceil(8)
    }

    /// The smallest byte range covering this extent.
    pub fn byte_span(&self) -> ByteExtent {
        ByteExtent::new(self.start_byte(), self.end_byte() - self.start_byte())
    }
}

impl fmt::Display for ByteExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.offset, self.length)
    }
}

impl fmt::Display for BitExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.offset, self.length)
    }
}

/// True if any extent in `a` overlaps any extent in `b`.
pub fn extents_overlap(a: &[ByteExtent], b: &[ByteExtent]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.overlaps(y)))
}

/// Total number of bytes covered by `extents`.
pub fn total_length(extents: &[ByteExtent]) -> u64 {
    extents.iter().map(|e| e.length).sum()
}

/// Parse a comma-separated `offset:length` list, e.g. `"0:4096,8192:100"`.
///
/// The same syntax is used for byte and bit extents; the caller decides the
/// unit.
pub fn parse_extents(s: &str) -> Result<Vec<ByteExtent>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|item| {
            let (off, len) = item
                .trim()
                .split_once(':')
                .ok_or_else(|| invalid(format!("extent '{item}' is not offset:length")))?;
            let offset = off
                .trim()
                .parse()
                .map_err(|e| invalid(format!("extent offset '{off}': {e}")))?;
            let length = len
                .trim()
                .parse()
                .map_err(|e| invalid(format!("extent length '{len}': {e}")))?;
            Ok(ByteExtent::new(offset, length))
        })
        .collect()
}

/// Checks that deflate bit extents are non-empty, sorted and disjoint, and
/// that an extent beginning mid-byte is directly preceded by another extent
/// ending at the same bit (the shared byte is produced by deflate content on
/// both sides).
pub fn validate_deflates(deflates: &[BitExtent]) -> Result<()> {
    let mut prev: Option<&BitExtent> = None;
    for (i, d) in deflates.iter().enumerate() {
        if d.length == 0 {
            return Err(invalid(format!("deflate extent #{i} is empty")));
        }
        if d.offset.checked_add(d.length).is_none_or(|end| end > u64::MAX - 7) {
            return Err(invalid(format!("deflate extent #{i} ({d}) overflows")));
        }
        if let Some(p) = prev
            && d.offset < p.end()
        {
            return Err(invalid(format!(
                "deflate extent #{i} ({d}) overlaps or precedes #{} ({p})",
                i - 1
            )));
        }
        if d.offset % 8 != 0 && prev.is_none_or(|p| p.end() != d.offset) {
            return Err(invalid(format!(
                "deflate extent #{i} ({d}) starts mid-byte without an adjacent predecessor"
            )));
        }
        prev = Some(d);
    }
    Ok(())
}

/// True if deflate `i` shares its first byte with deflate `i - 1`.
#[inline]
pub(crate) fn shares_first_byte(deflates: &[BitExtent], i: usize) -> bool {
    i > 0 && deflates[i].offset % 8 != 0 && deflates[i - 1].end() == deflates[i].offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_extent_byte_span() {
        let e = BitExtent::new(13, 20);
        assert_eq!(e.start_byte(), 1);
        assert_eq!(e.end_byte(), 5);
        assert_eq!(e.byte_span(), ByteExtent::new(1, 4));
        assert_eq!(ByteExtent::new(2, 3).to_bits(), BitExtent::new(16, 24));
    }

    #[test]
    fn overlap_detection() {
        let a = [ByteExtent::new(0, 10), ByteExtent::new(100, 10)];
        let b = [ByteExtent::new(10, 90)];
        assert!(!extents_overlap(&a, &b));
        let c = [ByteExtent::new(105, 1)];
        assert!(extents_overlap(&a, &c));
    }

    #[test]
    fn parse_extent_lists() {
        assert_eq!(
            parse_extents("0:4096, 8192:100").unwrap(),
            vec![ByteExtent::new(0, 4096), ByteExtent::new(8192, 100)]
        );
        assert!(parse_extents("").unwrap().is_empty());
        assert!(parse_extents("12").is_err());
        assert!(parse_extents("a:1").is_err());
    }

    #[test]
    fn validate_accepts_adjacent_mid_byte_blocks() {
        let blocks = [BitExtent::new(16, 21), BitExtent::new(37, 40)];
        validate_deflates(&blocks).unwrap();
        assert!(shares_first_byte(&blocks, 1));
        assert!(!shares_first_byte(&blocks, 0));
    }

    #[test]
    fn validate_rejects_bad_layouts() {
        assert!(validate_deflates(&[BitExtent::new(0, 0)]).is_err());
        assert!(validate_deflates(&[BitExtent::new(3, 10)]).is_err());
        assert!(validate_deflates(&[BitExtent::new(0, 16), BitExtent::new(8, 16)]).is_err());
        assert!(validate_deflates(&[BitExtent::new(0, 12), BitExtent::new(13, 16)]).is_err());
    }
}
