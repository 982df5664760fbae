// Deflate to puff transcoding.

use super::data::{BlockType, MAX_DISTANCE, MAX_LENGTH, MIN_LENGTH, PuffData};
use super::writer::PuffWriter;
use crate::bits::BitReader;
use crate::error::{Result, insufficient_input, invalid};
use crate::extent::BitExtent;
use crate::huffman::{
    DISTANCE_BASES, DISTANCE_EXTRA_BITS, END_OF_BLOCK, HuffmanTable, LENGTH_BASES,
    LENGTH_EXTRA_BITS, NUM_DISTANCE_CODES, NUM_LIT_LEN_CODES,
};

/// Decodes deflate blocks into puff items.
///
/// One `Puffer` can be reused across any number of streams; the Huffman
/// table is rebuilt for every block.
#[derive(Default)]
pub struct Puffer {
    table: HuffmanTable,
}

impl Puffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puff every block in `br` into `pw`.
    ///
    /// Blocks are read while at least a byte's worth of bits remain, so
    /// trailing padding after the last block is ignored. When `deflates` is
    /// given, the bit extent of each block is appended to it.
    pub fn puff_deflate(
        &mut self,
        br: &mut BitReader<'_>,
        pw: &mut PuffWriter<'_>,
        mut deflates: Option<&mut Vec<BitExtent>>,
    ) -> Result<()> {
        while br.cache_bits(8) {
            let start = br.offset_in_bits();
            let header = br.take_bits(3)?;
            let final_block = header & 1 != 0;
            let block_type = BlockType::from_bits(header >> 1)?;

            match block_type {
                BlockType::Uncompressed => {
                    let pad = br.read_boundary_bits()?;
                    br.skip_boundary_bits()?;
                    let len = br.take_bits(16)?;
                    let nlen = br.take_bits(16)?;
                    if len ^ nlen != 0xFFFF {
                        return Err(invalid(format!(
                            "stored block LEN {len:#06x} does not match NLEN {nlen:#06x}"
                        )));
                    }
                    pw.insert(&PuffData::BlockMetadata {
                        final_block,
                        block_type,
                        payload: &[pad],
                    })?;
                    if len > 0 {
                        pw.insert(&PuffData::Literals(br.read_bytes(len as usize)?))?;
                    }
                    pw.insert(&PuffData::EndOfBlock)?;
                }
                BlockType::Fixed => {
                    self.table.build_fixed_huffman_table()?;
                    pw.insert(&PuffData::BlockMetadata {
                        final_block,
                        block_type,
                        payload: &[],
                    })?;
                    self.puff_symbols(br, pw)?;
                }
                BlockType::Dynamic => {
                    let captured = self.table.build_dynamic_huffman_table(br)?;
                    pw.insert(&PuffData::BlockMetadata {
                        final_block,
                        block_type,
                        payload: &captured,
                    })?;
                    self.puff_symbols(br, pw)?;
                }
            }

            if let Some(list) = deflates.as_deref_mut() {
                list.push(BitExtent::new(start, br.offset_in_bits() - start));
            }
        }
        pw.flush()
    }

    fn puff_symbols(&self, br: &mut BitReader<'_>, pw: &mut PuffWriter<'_>) -> Result<()> {
        loop {
            let symbol = self.next_lit_len(br)?;
            match symbol {
                0..=255 => pw.insert(&PuffData::Literal(symbol as u8))?,
                END_OF_BLOCK => {
                    pw.insert(&PuffData::EndOfBlock)?;
                    return Ok(());
                }
                _ if (symbol as usize) < NUM_LIT_LEN_CODES => {
                    let idx = (symbol - 257) as usize;
                    let extra = br.take_bits(LENGTH_EXTRA_BITS[idx] as u32)?;
                    // Code 284 with all-ones extra bits also spells 258,
                    // which the encoder would write as code 285.
                    if symbol == 284 && extra == 31 {
                        return Err(invalid("non-canonical encoding of length 258"));
                    }
                    let length = LENGTH_BASES[idx] as u32 + extra;

                    let dist_symbol = self.next_distance(br)? as usize;
                    if dist_symbol >= NUM_DISTANCE_CODES {
                        return Err(invalid(format!("distance symbol {dist_symbol}")));
                    }
                    let extra = br.take_bits(DISTANCE_EXTRA_BITS[dist_symbol] as u32)?;
                    let distance = DISTANCE_BASES[dist_symbol] as u32 + extra;

                    if !(MIN_LENGTH as u32..=MAX_LENGTH as u32).contains(&length)
                        || !(1..=MAX_DISTANCE).contains(&distance)
                    {
                        return Err(invalid(format!(
                            "back-reference length {length} distance {distance}"
                        )));
                    }
                    pw.insert(&PuffData::LenDist {
                        length: length as u16,
                        distance: distance as u16,
                    })?;
                }
                _ => return Err(invalid(format!("literal/length symbol {symbol}"))),
            }
        }
    }

    fn next_lit_len(&self, br: &mut BitReader<'_>) -> Result<u16> {
        // The shortest code that can legally end a block is end-of-block.
        if !br.cache_bits(self.table.end_of_block_bit_length()) {
            return Err(insufficient_input("deflate block ends before end-of-block"));
        }
        let max_bits = self.table.lit_len_max_bits();
        let (symbol, len) = match self.table.lit_len_alphabet(br.read_bits(max_bits)) {
            Ok(found) => found,
            Err(_) if !br.cache_bits(max_bits) => {
                return Err(insufficient_input("literal/length code past end of input"));
            }
            Err(e) => return Err(e),
        };
        if !br.cache_bits(len) {
            return Err(insufficient_input("literal/length code past end of input"));
        }
        br.drop_bits(len);
        Ok(symbol)
    }

    fn next_distance(&self, br: &mut BitReader<'_>) -> Result<u16> {
        let max_bits = self.table.distance_max_bits();
        let (symbol, len) = match self.table.distance_alphabet(br.read_bits(max_bits)) {
            Ok(found) => found,
            Err(_) if !br.cache_bits(max_bits) => {
                return Err(insufficient_input("distance code past end of input"));
            }
            Err(e) => return Err(e),
        };
        if !br.cache_bits(len) {
            return Err(insufficient_input("distance code past end of input"));
        }
        br.drop_bits(len);
        Ok(symbol)
    }
}
