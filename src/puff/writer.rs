// Puff stream serializer.

use super::data::{
    BlockType, END_OF_BLOCK_CODE, ESCAPE, LONG_RUN_MARKER, MAX_DISTANCE, MAX_LENGTH, MAX_RUN,
    MIN_LENGTH, PuffData, SHORT_LENGTH_LIMIT, SHORT_RUN_LIMIT,
};
use crate::bits::Output;
use crate::error::{Result, invalid};

/// Serializes [`PuffData`] items.
///
/// Adjacent literals are merged into runs, so the writer holds back pending
/// literal bytes until the next non-literal item (or `flush`).
pub struct PuffWriter<'a> {
    out: Output<'a>,
    index: usize,
    pending: Vec<u8>,
}

impl<'a> PuffWriter<'a> {
    pub fn new(out: Output<'a>) -> Self {
        Self {
            out,
            index: 0,
            pending: Vec::new(),
        }
    }

    pub fn insert(&mut self, item: &PuffData<'_>) -> Result<()> {
        match *item {
            PuffData::Literal(byte) => {
                if self.pending.len() == MAX_RUN {
                    self.flush_literals()?;
                }
                self.pending.push(byte);
            }
            PuffData::Literals(bytes) => {
                let mut rest = bytes;
                while !rest.is_empty() {
                    if self.pending.len() == MAX_RUN {
                        self.flush_literals()?;
                    }
                    let take = rest.len().min(MAX_RUN - self.pending.len());
                    self.pending.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                }
            }
            PuffData::LenDist { length, distance } => {
                if !(MIN_LENGTH..=MAX_LENGTH).contains(&length)
                    || distance == 0
                    || distance as u32 > MAX_DISTANCE
                {
                    return Err(invalid(format!(
                        "back-reference length {length} distance {distance}"
                    )));
                }
                self.flush_literals()?;
                if length <= SHORT_LENGTH_LIMIT {
                    self.put(0x80 | (length - MIN_LENGTH) as u8)?;
                } else {
                    self.put(ESCAPE)?;
                    self.put((length - SHORT_LENGTH_LIMIT - 1) as u8)?;
                }
                self.put_slice(&(distance - 1).to_be_bytes())?;
            }
            PuffData::BlockMetadata {
                final_block,
                block_type,
                payload,
            } => {
                self.flush_literals()?;
                let len = u16::try_from(payload.len() + 1)
                    .map_err(|_| invalid("block metadata too large"))?;
                if block_type == BlockType::Uncompressed && payload.len() != 1 {
                    return Err(invalid("uncompressed block metadata needs a padding byte"));
                }
                self.put_slice(&len.to_be_bytes())?;
                self.put(((final_block as u8) << 7) | ((block_type as u8) << 5))?;
                self.put_slice(payload)?;
            }
            PuffData::EndOfBlock => {
                self.flush_literals()?;
                self.put_slice(&[ESCAPE, END_OF_BLOCK_CODE])?;
            }
        }
        Ok(())
    }

    /// Write out any held-back literals.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_literals()
    }

    /// Bytes written so far, not counting held-back literals.
    #[inline]
    pub fn size(&self) -> usize {
        self.index
    }

    fn flush_literals(&mut self) -> Result<()> {
        let len = self.pending.len();
        if len == 0 {
            return Ok(());
        }
        if len <= SHORT_RUN_LIMIT {
            self.put((len - 1) as u8)?;
        } else {
            self.put(LONG_RUN_MARKER)?;
            self.put_slice(&((len - SHORT_RUN_LIMIT - 1) as u16).to_be_bytes())?;
        }
        let pending = std::mem::take(&mut self.pending);
        self.put_slice(&pending)?;
        self.pending = pending;
        self.pending.clear();
        Ok(())
    }

    #[inline]
    fn put(&mut self, byte: u8) -> Result<()> {
        self.out.put(self.index, byte)?;
        self.index += 1;
        Ok(())
    }

    #[inline]
    fn put_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.put_slice(self.index, bytes)?;
        self.index += bytes.len();
        Ok(())
    }
}
