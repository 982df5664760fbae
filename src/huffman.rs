// Canonical Huffman tables for deflate (RFC 1951, section 3.2).
//
// A block uses two alphabets: literal/length (0..=285, plus the two unused
// fixed-table symbols 286/287) and distance (0..=29). Both are derived from
// per-symbol code lengths by the standard canonical construction. Decoding
// uses a flat lookup table indexed by the next `max_bits` input bits; codes
// are kept bit-reversed so that they read and write LSB-first like every
// other deflate field.
//
// Dynamic tables are parsed from the bitstream on the decode side and the
// consumed bits are captured verbatim. The encode side replays those bits
// instead of deriving a table of its own, so the output is bit-exact even
// when several encodings of the same code lengths would be valid.

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result, insufficient_input, invalid};

// ---------------------------------------------------------------------------
// Deflate constants
// ---------------------------------------------------------------------------

pub const MAX_CODE_BITS: u32 = 15;
pub const END_OF_BLOCK: u16 = 256;
pub const NUM_LIT_LEN_CODES: usize = 286;
pub const NUM_DISTANCE_CODES: usize = 30;

/// Base match length for length codes 257..=285.
pub const LENGTH_BASES: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distance for distance codes 0..=29.
pub const DISTANCE_BASES: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of the code-length code lengths.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

// ---------------------------------------------------------------------------
// Alphabet
// ---------------------------------------------------------------------------

/// One canonical code: per-symbol (reversed code, length) plus a decode LUT.
#[derive(Debug, Clone, Default)]
struct Alphabet {
    lengths: Vec<u8>,
    codes: Vec<u16>,
    /// `symbol << 4 | length`, zero when no code matches.
    lut: Vec<u16>,
    max_bits: u32,
}

impl Alphabet {
    fn build(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_BITS as usize + 1];
        for &len in lengths {
            if len as u32 > MAX_CODE_BITS {
                return Err(invalid(format!("Huffman code length {len} exceeds 15")));
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        // Reject over-subscribed sets; incomplete ones are legal in deflate.
        let mut left = 1i32;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(invalid("over-subscribed Huffman code lengths"));
            }
        }

        let mut next = [0u16; MAX_CODE_BITS as usize + 2];
        let mut code = 0u16;
        for bits in 1..=MAX_CODE_BITS as usize {
            code = (code + counts[bits - 1]) << 1;
            next[bits] = code;
        }

        let max_bits = lengths.iter().copied().max().unwrap_or(0) as u32;
        let mut codes = vec![0u16; lengths.len()];
        let mut lut = vec![0u16; if max_bits == 0 { 0 } else { 1 << max_bits }];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let reversed = reverse_bits(next[len as usize], len as u32);
            next[len as usize] += 1;
            codes[symbol] = reversed;

            let entry = ((symbol as u16) << 4) | len as u16;
            let mut idx = reversed as usize;
            while idx < lut.len() {
                lut[idx] = entry;
                idx += 1 << len;
            }
        }

        Ok(Self {
            lengths: lengths.to_vec(),
            codes,
            lut,
            max_bits,
        })
    }

    /// Match the peeked bits against the table: `(symbol, code length)`.
    #[inline]
    fn decode(&self, bits: u32) -> Result<(u16, u32)> {
        let idx = (bits as usize) & (self.lut.len().wrapping_sub(1));
        match self.lut.get(idx) {
            Some(&entry) if entry != 0 => Ok((entry >> 4, (entry & 0xF) as u32)),
            _ => Err(invalid("no Huffman code matches the input bits")),
        }
    }

    #[inline]
    fn encode(&self, symbol: usize) -> Result<(u16, u32)> {
        match self.lengths.get(symbol) {
            Some(&len) if len > 0 => Ok((self.codes[symbol], len as u32)),
            _ => Err(invalid(format!("symbol {symbol} has no Huffman code"))),
        }
    }

    /// Decode one symbol from `br`, consuming its code.
    fn read_symbol(&self, br: &mut BitReader<'_>) -> Result<u16> {
        if !br.cache_bits(1) {
            return Err(insufficient_input("Huffman code past end of input"));
        }
        let (symbol, len) = self.decode(br.read_bits(self.max_bits))?;
        if !br.cache_bits(len) {
            return Err(insufficient_input("Huffman code past end of input"));
        }
        br.drop_bits(len);
        Ok(symbol)
    }
}

#[inline]
fn reverse_bits(code: u16, len: u32) -> u16 {
    code.reverse_bits() >> (16 - len)
}

// ---------------------------------------------------------------------------
// HuffmanTable
// ---------------------------------------------------------------------------

/// Literal/length and distance codes for the active block.
#[derive(Debug, Clone, Default)]
pub struct HuffmanTable {
    lit_len: Alphabet,
    distance: Alphabet,
}

impl HuffmanTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the fixed codes of BTYPE=01.
    pub fn build_fixed_huffman_table(&mut self) -> Result<()> {
        let mut lit_len = [0u8; 288];
        lit_len[..144].fill(8);
        lit_len[144..256].fill(9);
        lit_len[256..280].fill(7);
        lit_len[280..].fill(8);
        self.lit_len = Alphabet::build(&lit_len)?;
        self.distance = Alphabet::build(&[5u8; NUM_DISTANCE_CODES])?;
        Ok(())
    }

    /// Parse a BTYPE=10 table description from `br`, returning the exact
    /// bits it occupied (packed LSB-first) for later replay.
    pub fn build_dynamic_huffman_table(&mut self, br: &mut BitReader<'_>) -> Result<Vec<u8>> {
        let start = br.offset_in_bits();
        self.parse_dynamic(br)?;
        Ok(br.copy_bits(start, br.offset_in_bits()))
    }

    /// Rebuild the table from bits captured by `build_dynamic_huffman_table`
    /// and write those same bits to `bw`.
    pub fn replay_dynamic_huffman_table(
        &mut self,
        captured: &[u8],
        bw: &mut BitWriter<'_>,
    ) -> Result<()> {
        let mut cr = BitReader::new(captured);
        self.parse_dynamic(&mut cr).map_err(|e| match e {
            Error::InsufficientInput(msg) => invalid(format!("truncated dynamic table: {msg}")),
            other => other,
        })?;

        let mut left = cr.offset_in_bits();
        let mut rr = BitReader::new(captured);
        while left > 0 {
            let n = left.min(16) as u32;
            bw.write_bits(n, rr.take_bits(n)?)?;
            left -= n as u64;
        }
        Ok(())
    }

    fn parse_dynamic(&mut self, br: &mut BitReader<'_>) -> Result<()> {
        let num_lit_len = br.take_bits(5)? as usize + 257;
        let num_distance = br.take_bits(5)? as usize + 1;
        let num_code_len = br.take_bits(4)? as usize + 4;
        if num_lit_len > NUM_LIT_LEN_CODES {
            return Err(invalid(format!("{num_lit_len} literal/length codes")));
        }
        if num_distance > NUM_DISTANCE_CODES {
            return Err(invalid(format!("{num_distance} distance codes")));
        }

        let mut code_len_lengths = [0u8; 19];
        for &symbol in &CODE_LENGTH_ORDER[..num_code_len] {
            code_len_lengths[symbol] = br.take_bits(3)? as u8;
        }
        let code_len = Alphabet::build(&code_len_lengths)?;

        let total = num_lit_len + num_distance;
        let mut lengths = vec![0u8; total];
        let mut i = 0;
        while i < total {
            let symbol = code_len.read_symbol(br)?;
            let (value, repeat) = match symbol {
                0..=15 => (symbol as u8, 1),
                16 => {
                    if i == 0 {
                        return Err(invalid("repeat code with no previous length"));
                    }
                    (lengths[i - 1], 3 + br.take_bits(2)? as usize)
                }
                17 => (0, 3 + br.take_bits(3)? as usize),
                18 => (0, 11 + br.take_bits(7)? as usize),
                _ => return Err(invalid(format!("code length symbol {symbol}"))),
            };
            if i + repeat > total {
                return Err(invalid("code length repeat overruns the table"));
            }
            lengths[i..i + repeat].fill(value);
            i += repeat;
        }

        if lengths[END_OF_BLOCK as usize] == 0 {
            return Err(invalid("dynamic table has no end-of-block code"));
        }
        self.lit_len = Alphabet::build(&lengths[..num_lit_len])?;
        self.distance = Alphabet::build(&lengths[num_lit_len..])?;
        Ok(())
    }

    /// Decode a literal/length symbol from peeked bits.
    #[inline]
    pub fn lit_len_alphabet(&self, bits: u32) -> Result<(u16, u32)> {
        self.lit_len.decode(bits)
    }

    /// Decode a distance symbol from peeked bits.
    #[inline]
    pub fn distance_alphabet(&self, bits: u32) -> Result<(u16, u32)> {
        self.distance.decode(bits)
    }

    /// Reversed code and bit length for a literal/length symbol.
    #[inline]
    pub fn lit_len_huffman(&self, symbol: u16) -> Result<(u16, u32)> {
        self.lit_len.encode(symbol as usize)
    }

    /// Reversed code and bit length for a distance symbol.
    #[inline]
    pub fn distance_huffman(&self, index: u16) -> Result<(u16, u32)> {
        self.distance.encode(index as usize)
    }

    #[inline]
    pub fn lit_len_max_bits(&self) -> u32 {
        self.lit_len.max_bits
    }

    #[inline]
    pub fn distance_max_bits(&self) -> u32 {
        self.distance.max_bits
    }

    /// Code length of the end-of-block symbol; the shortest read that can
    /// still be valid at the tail of a block.
    #[inline]
    pub fn end_of_block_bit_length(&self) -> u32 {
        self.lit_len
            .lengths
            .get(END_OF_BLOCK as usize)
            .copied()
            .unwrap_or(0) as u32
    }
}
