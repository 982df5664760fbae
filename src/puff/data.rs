// The puff intermediate representation.

use crate::error::{Result, invalid};

/// Deflate block type, as carried in the 2-bit BTYPE field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockType {
    Uncompressed = 0,
    Fixed = 1,
    Dynamic = 2,
}

impl BlockType {
    pub fn from_bits(bits: u32) -> Result<Self> {
        match bits {
            0 => Ok(Self::Uncompressed),
            1 => Ok(Self::Fixed),
            2 => Ok(Self::Dynamic),
            _ => Err(invalid(format!("reserved deflate block type {bits}"))),
        }
    }

    #[inline]
    pub fn bits(self) -> u32 {
        self as u32
    }
}

/// One element of a puff stream.
///
/// A valid stream is a sequence of blocks, each `BlockMetadata`, then any
/// number of literal and back-reference items, then `EndOfBlock`. For an
/// uncompressed block the body is at most one `Literals` run.
///
/// Byte payloads borrow from whoever produced the item (the deflate input
/// when puffing, the puff buffer when huffing), so a 64 KiB stored block is
/// never copied on its way through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuffData<'a> {
    Literal(u8),
    Literals(&'a [u8]),
    LenDist {
        length: u16,
        distance: u16,
    },
    /// `payload` is the padding-bit value for an uncompressed block (one
    /// byte), empty for a fixed block, and the captured table bits for a
    /// dynamic block.
    BlockMetadata {
        final_block: bool,
        block_type: BlockType,
        payload: &'a [u8],
    },
    EndOfBlock,
}

pub const MIN_LENGTH: u16 = 3;
pub const MAX_LENGTH: u16 = 258;
pub const MAX_DISTANCE: u32 = 32768;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------
//
// Within a block the first byte of an item selects its kind:
//   0x00..=0x7E  literal run of (b + 1) bytes
//   0x7F         literal run, BE u16 (len - 128) follows
//   0x80..=0xFE  back-reference of length (b & 0x7F) + 3, BE u16 (dist - 1)
//   0xFF         escape; next byte x: x <= 128 is a back-reference of length
//                x + 130, x == 129 is end-of-block
// A block opens with BE u16 N and N metadata bytes.

pub(crate) const SHORT_RUN_LIMIT: usize = 127;
pub(crate) const LONG_RUN_MARKER: u8 = 0x7F;
pub(crate) const MAX_RUN: usize = SHORT_RUN_LIMIT + 1 + u16::MAX as usize;
pub(crate) const SHORT_LENGTH_LIMIT: u16 = 129;
pub(crate) const ESCAPE: u8 = 0xFF;
pub(crate) const END_OF_BLOCK_CODE: u8 = 0x81;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_bits() {
        for t in [BlockType::Uncompressed, BlockType::Fixed, BlockType::Dynamic] {
            assert_eq!(BlockType::from_bits(t.bits()).unwrap(), t);
        }
        assert!(BlockType::from_bits(3).is_err());
    }

    #[test]
    fn format_constants_are_consistent() {
        assert_eq!(MAX_RUN, 65663);
        // The escape's length range ends one below the end-of-block code.
        assert_eq!(
            MAX_LENGTH - (SHORT_LENGTH_LIMIT + 1),
            END_OF_BLOCK_CODE as u16 - 1
        );
    }
}
