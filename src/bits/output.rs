// Byte output targets shared by the bit writer and the puff writer.

use crate::error::{Error, Result};

/// Where a writer's bytes go.
///
/// `Counting` stores nothing and only lets the writer advance its byte
/// counter, which is how puff and deflate sizes are discovered before any
/// buffer is allocated.
pub enum Output<'a> {
    Counting,
    Buffer(&'a mut [u8]),
}

impl Output<'_> {
    #[inline]
    pub fn is_counting(&self) -> bool {
        matches!(self, Output::Counting)
    }

    /// Store `byte` at `index`.
    #[inline]
    pub fn put(&mut self, index: usize, byte: u8) -> Result<()> {
        match self {
            Output::Counting => Ok(()),
            Output::Buffer(buf) => match buf.get_mut(index) {
                Some(slot) => {
                    *slot = byte;
                    Ok(())
                }
                None => Err(overflow(index, 1, buf.len())),
            },
        }
    }

    /// Store `bytes` starting at `index`.
    pub fn put_slice(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        match self {
            Output::Counting => Ok(()),
            Output::Buffer(buf) => {
                let end = index + bytes.len();
                if end > buf.len() {
                    return Err(overflow(index, bytes.len(), buf.len()));
                }
                buf[index..end].copy_from_slice(bytes);
                Ok(())
            }
        }
    }
}

fn overflow(index: usize, len: usize, capacity: usize) -> Error {
    Error::InsufficientOutput(format!(
        "writing {len} bytes at {index} overflows {capacity}-byte buffer"
    ))
}
