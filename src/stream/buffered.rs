// Buffering stream.
//
// Used when the patch source and destination denote overlapping storage:
// every write is held in memory and only reaches the underlying stream on
// `close`, so the patcher never reads source bytes it has already replaced.

use super::Stream;
use crate::error::{Result, invalid, unsupported};

pub struct BufferedStream<S: Stream> {
    inner: S,
    buffer: Vec<u8>,
    offset: u64,
    closed: bool,
}

impl<S: Stream> BufferedStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            offset: 0,
            closed: false,
        }
    }
}

impl<S: Stream> Stream for BufferedStream<S> {
    fn size(&self) -> Result<u64> {
        Ok(self.buffer.len() as u64)
    }

    fn offset(&self) -> Result<u64> {
        Ok(self.offset)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.buffer.len() as u64 {
            return Err(invalid(format!(
                "seek to {offset} past buffered end {}",
                self.buffer.len()
            )));
        }
        self.offset = offset;
        Ok(())
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<()> {
        Err(unsupported("read from a buffering write stream"))
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if self.closed {
            return Err(invalid("write after close"));
        }
        let start = self.offset as usize;
        let end = start + buf.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[start..end].copy_from_slice(buf);
        self.offset = end as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::debug!("flushing {} buffered bytes", self.buffer.len());
        self.inner.seek(0)?;
        self.inner.write(&self.buffer)?;
        self.buffer = Vec::new();
        self.inner.close()
    }
}
