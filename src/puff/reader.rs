// Puff stream parser.

use super::data::{
    BlockType, END_OF_BLOCK_CODE, ESCAPE, LONG_RUN_MARKER, MAX_DISTANCE, MIN_LENGTH, PuffData,
    SHORT_LENGTH_LIMIT, SHORT_RUN_LIMIT,
};
use crate::error::{Result, insufficient_input, invalid};

/// Reads [`PuffData`] items back from a puff buffer.
///
/// The encoding is context dependent: the first item of every block is its
/// metadata, so the reader tracks whether it is between blocks.
pub struct PuffReader<'a> {
    data: &'a [u8],
    index: usize,
    in_block: bool,
}

impl<'a> PuffReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            index: 0,
            in_block: false,
        }
    }

    #[inline]
    pub fn bytes_remaining(&self) -> usize {
        self.data.len() - self.index
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.index
    }

    pub fn get_next(&mut self) -> Result<PuffData<'a>> {
        if !self.in_block {
            let len = u16::from_be_bytes(self.take_array()?) as usize;
            let meta = self.take(len)?;
            let Some((&header, payload)) = meta.split_first() else {
                return Err(invalid("empty block metadata"));
            };
            if header & 0x1F != 0 {
                return Err(invalid(format!("block metadata header {header:#04x}")));
            }
            let block_type = BlockType::from_bits(((header >> 5) & 0x3) as u32)?;
            self.in_block = true;
            return Ok(PuffData::BlockMetadata {
                final_block: header & 0x80 != 0,
                block_type,
                payload,
            });
        }

        let tag = self.take_byte()?;
        if tag < LONG_RUN_MARKER {
            return Ok(PuffData::Literals(self.take(tag as usize + 1)?));
        }
        if tag == LONG_RUN_MARKER {
            let extra = u16::from_be_bytes(self.take_array()?) as usize;
            return Ok(PuffData::Literals(self.take(extra + SHORT_RUN_LIMIT + 1)?));
        }

        let length = if tag == ESCAPE {
            let x = self.take_byte()?;
            if x == END_OF_BLOCK_CODE {
                self.in_block = false;
                return Ok(PuffData::EndOfBlock);
            }
            if x > END_OF_BLOCK_CODE {
                return Err(invalid(format!("escape code {x:#04x}")));
            }
            x as u16 + SHORT_LENGTH_LIMIT + 1
        } else {
            (tag & 0x7F) as u16 + MIN_LENGTH
        };
        let distance = u16::from_be_bytes(self.take_array()?) as u32 + 1;
        if distance > MAX_DISTANCE {
            return Err(invalid(format!("back-reference distance {distance}")));
        }
        Ok(PuffData::LenDist {
            length,
            distance: distance as u16,
        })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes_remaining() < len {
            return Err(insufficient_input(format!(
                "puff item of {len} bytes at {} runs past end ({} left)",
                self.index,
                self.bytes_remaining()
            )));
        }
        let out = &self.data[self.index..self.index + len];
        self.index += len;
        Ok(out)
    }

    fn take_byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reads_fixed_block() {
        let buf = [
            0x00, 0x01, 0xA0, 0x03, 0x61, 0x62, 0x63, 0x61, 0x8B, 0x00, 0x02, 0xFF, 0x81,
        ];
        let mut r = PuffReader::new(&buf);
        assert_eq!(
            r.get_next().unwrap(),
            PuffData::BlockMetadata {
                final_block: true,
                block_type: BlockType::Fixed,
                payload: &[],
            }
        );
        assert_eq!(r.get_next().unwrap(), PuffData::Literals(b"abca"));
        assert_eq!(
            r.get_next().unwrap(),
            PuffData::LenDist {
                length: 14,
                distance: 3
            }
        );
        assert_eq!(r.get_next().unwrap(), PuffData::EndOfBlock);
        assert_eq!(r.bytes_remaining(), 0);
    }

    #[test]
    fn reads_escaped_length_and_long_run() {
        let mut buf = vec![0x00, 0x02, 0x00, 0x05, 0xFF, 0x80, 0x7F, 0xFF];
        buf.extend_from_slice(&[0x7F, 0x00, 0x01]);
        buf.extend(std::iter::repeat_n(9u8, 129));
        buf.extend_from_slice(&[0xFF, 0x81]);
        let mut r = PuffReader::new(&buf);
        assert!(matches!(
            r.get_next().unwrap(),
            PuffData::BlockMetadata {
                final_block: false,
                block_type: BlockType::Uncompressed,
                payload: [5],
            }
        ));
        assert_eq!(
            r.get_next().unwrap(),
            PuffData::LenDist {
                length: 258,
                distance: 32768
            }
        );
        match r.get_next().unwrap() {
            PuffData::Literals(bytes) => assert_eq!(bytes.len(), 129),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(r.get_next().unwrap(), PuffData::EndOfBlock);
    }

    #[test]
    fn truncation_is_insufficient_input() {
        let buf = [0x00, 0x01, 0x20, 0x05, 1, 2];
        let mut r = PuffReader::new(&buf);
        r.get_next().unwrap();
        assert_eq!(
            r.get_next().unwrap_err().kind(),
            ErrorKind::InsufficientInput
        );

        let mut r = PuffReader::new(&[0x00, 0x05, 0x20]);
        assert_eq!(
            r.get_next().unwrap_err().kind(),
            ErrorKind::InsufficientInput
        );
    }

    #[test]
    fn malformed_items_are_invalid() {
        // Reserved block type.
        let mut r = PuffReader::new(&[0x00, 0x01, 0x60]);
        assert_eq!(r.get_next().unwrap_err().kind(), ErrorKind::InvalidInput);

        // Escape code past end-of-block.
        let mut r = PuffReader::new(&[0x00, 0x01, 0x20, 0xFF, 0x82]);
        r.get_next().unwrap();
        assert_eq!(r.get_next().unwrap_err().kind(), ErrorKind::InvalidInput);

        // Distance 32769.
        let mut r = PuffReader::new(&[0x00, 0x01, 0x20, 0x80, 0x80, 0x00]);
        r.get_next().unwrap();
        assert_eq!(r.get_next().unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
