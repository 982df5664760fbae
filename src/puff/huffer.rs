// Puff to deflate transcoding.

use super::data::{BlockType, PuffData};
use super::reader::PuffReader;
use crate::bits::BitWriter;
use crate::error::{Result, invalid};
use crate::huffman::{
    DISTANCE_BASES, DISTANCE_EXTRA_BITS, END_OF_BLOCK, HuffmanTable, LENGTH_BASES,
    LENGTH_EXTRA_BITS,
};

/// Re-encodes puff items into the deflate bitstream they came from.
#[derive(Default)]
pub struct Huffer {
    table: HuffmanTable,
}

impl Huffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Huff every block in `pr` into `bw`, then flush the final partial byte.
    pub fn huff_deflate(&mut self, pr: &mut PuffReader<'_>, bw: &mut BitWriter<'_>) -> Result<()> {
        while pr.bytes_remaining() > 0 {
            let PuffData::BlockMetadata {
                final_block,
                block_type,
                payload,
            } = pr.get_next()?
            else {
                return Err(invalid("puff block does not start with metadata"));
            };
            bw.write_bits(1, final_block as u32)?;
            bw.write_bits(2, block_type.bits())?;

            match block_type {
                BlockType::Uncompressed => {
                    let [pad] = payload else {
                        return Err(invalid("uncompressed block metadata needs a padding byte"));
                    };
                    bw.write_boundary_bits(*pad)?;
                    self.huff_stored_body(pr, bw)?;
                }
                BlockType::Fixed => {
                    self.table.build_fixed_huffman_table()?;
                    self.huff_symbols(pr, bw)?;
                }
                BlockType::Dynamic => {
                    self.table.replay_dynamic_huffman_table(payload, bw)?;
                    self.huff_symbols(pr, bw)?;
                }
            }
        }
        bw.flush()
    }

    fn huff_stored_body(&self, pr: &mut PuffReader<'_>, bw: &mut BitWriter<'_>) -> Result<()> {
        let bytes: &[u8] = match pr.get_next()? {
            PuffData::Literals(bytes) => {
                if pr.get_next()? != PuffData::EndOfBlock {
                    return Err(invalid("uncompressed block holds more than one run"));
                }
                bytes
            }
            PuffData::EndOfBlock => &[],
            _ => return Err(invalid("uncompressed block holds non-literal data")),
        };
        let len = u16::try_from(bytes.len())
            .map_err(|_| invalid(format!("{}-byte uncompressed block", bytes.len())))?;
        bw.write_bits(16, len as u32)?;
        bw.write_bits(16, !len as u32)?;
        bw.write_bytes(bytes)
    }

    fn huff_symbols(&self, pr: &mut PuffReader<'_>, bw: &mut BitWriter<'_>) -> Result<()> {
        loop {
            match pr.get_next()? {
                PuffData::Literal(byte) => self.write_lit_len(bw, byte as u16)?,
                PuffData::Literals(bytes) => {
                    for &byte in bytes {
                        self.write_lit_len(bw, byte as u16)?;
                    }
                }
                PuffData::LenDist { length, distance } => {
                    let idx = base_index(&LENGTH_BASES, length);
                    self.write_lit_len(bw, 257 + idx as u16)?;
                    bw.write_bits(
                        LENGTH_EXTRA_BITS[idx] as u32,
                        (length - LENGTH_BASES[idx]) as u32,
                    )?;

                    let idx = base_index(&DISTANCE_BASES, distance);
                    let (code, len) = self.table.distance_huffman(idx as u16)?;
                    bw.write_bits(len, code as u32)?;
                    bw.write_bits(
                        DISTANCE_EXTRA_BITS[idx] as u32,
                        (distance - DISTANCE_BASES[idx]) as u32,
                    )?;
                }
                PuffData::EndOfBlock => return self.write_lit_len(bw, END_OF_BLOCK),
                PuffData::BlockMetadata { .. } => {
                    return Err(invalid("block metadata inside a block"));
                }
            }
        }
    }

    #[inline]
    fn write_lit_len(&self, bw: &mut BitWriter<'_>, symbol: u16) -> Result<()> {
        let (code, len) = self.table.lit_len_huffman(symbol)?;
        bw.write_bits(len, code as u32)
    }
}

/// Index of the last base not greater than `value`. Callers only pass
/// values at or above the first base.
#[inline]
fn base_index(bases: &[u16], value: u16) -> usize {
    bases
        .iter()
        .rposition(|&base| base <= value)
        .unwrap_or(0)
}
