// Write-only stream forwarding every write to a callback.

use std::io;

use super::Stream;
use crate::error::{Result, unsupported};

pub struct SinkStream<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    sink: F,
    written: u64,
}

impl<F> SinkStream<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    pub fn new(sink: F) -> Self {
        Self { sink, written: 0 }
    }
}

impl<F> Stream for SinkStream<F>
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn size(&self) -> Result<u64> {
        Err(unsupported("size of a sink stream"))
    }

    fn offset(&self) -> Result<u64> {
        Ok(self.written)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        // Only a no-op seek to the current position is meaningful.
        if offset == self.written {
            Ok(())
        } else {
            Err(unsupported("seek on a sink stream"))
        }
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<()> {
        Err(unsupported("read from a sink stream"))
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (self.sink)(buf)?;
        self.written += buf.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
