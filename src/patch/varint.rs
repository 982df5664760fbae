// Variable-length integers for the patch header.
//
// Base-128, big-endian: most-significant group first. Every byte except the
// last has bit 7 set.

use crate::error::{Result, insufficient_input, invalid};

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
const MAX_VARINT_LEN: usize = 10;

/// If any of these bits are set before a shift, the next `<< 7` overflows.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

/// Encode `num` into the tail of `buf`, returning the encoded length.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append the encoding of `num` to `out`.
pub fn write_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

/// Decode a value from the front of `data`: `(value, bytes consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize)> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(invalid("varint overflows 64 bits"));
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(insufficient_input("truncated varint"))
}

/// Encoded length of `num`.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn roundtrip_edges() {
        let cases: &[u64] = &[0, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX];
        for &val in cases {
            let mut out = Vec::new();
            write_u64(&mut out, val);
            assert_eq!(out.len(), sizeof_u64(val), "sizeof mismatch for {val}");
            assert_eq!(read_u64(&out).unwrap(), (val, out.len()));
        }
    }

    #[test]
    fn encoding_is_big_endian() {
        // 300 = (10) (0101100)
        let mut out = Vec::new();
        write_u64(&mut out, 300);
        assert_eq!(out, [0x82, 0x2C]);
    }

    #[test]
    fn truncated_and_overlong() {
        assert_eq!(
            read_u64(&[0x80, 0x80]).unwrap_err().kind(),
            ErrorKind::InsufficientInput
        );
        let overlong = [0xFF; 11];
        assert_eq!(read_u64(&overlong).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
