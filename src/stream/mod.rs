// Uniform random-access byte streams.
//
// Every layer above (PuffinStream, the bspatch interpreter, the diff driver)
// talks to storage through the `Stream` trait, so the same code runs over
// files, memory buffers, partition-style extent lists and write-only sinks.
//
// # Modules
//
// - `file`    : OS file, positioned through the file cursor
// - `memory`  : bounds-checked read-only slice or growable write-only Vec
// - `extent`  : one logical address space over a list of byte ranges
// - `sink`    : write-only, forwards every write to a callback
// - `buffered`: accumulates all writes, flushes once on close

pub mod buffered;
pub mod extent;
pub mod file;
pub mod memory;
pub mod sink;

pub use buffered::BufferedStream;
pub use extent::ExtentStream;
pub use file::FileStream;
pub use memory::MemoryStream;
pub use sink::SinkStream;

use crate::error::Result;

/// Random-access byte I/O.
///
/// `read` and `write` are all-or-nothing: a read that cannot be fully
/// satisfied fails with `InsufficientInput` instead of returning fewer bytes.
pub trait Stream {
    /// Total size of the stream in bytes.
    fn size(&self) -> Result<u64>;

    /// Current cursor position.
    fn offset(&self) -> Result<u64>;

    /// Move the cursor. Bounded streams reject positions past `size()`.
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Fill `buf` completely from the cursor, advancing it.
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` at the cursor, advancing it.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Flush pending data and release the underlying resource.
    fn close(&mut self) -> Result<()>;
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn size(&self) -> Result<u64> {
        (**self).size()
    }
    fn offset(&self) -> Result<u64> {
        (**self).offset()
    }
    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn size(&self) -> Result<u64> {
        (**self).size()
    }
    fn offset(&self) -> Result<u64> {
        (**self).offset()
    }
    fn seek(&mut self, offset: u64) -> Result<()> {
        (**self).seek(offset)
    }
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).read(buf)
    }
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Read the whole stream from offset zero.
pub fn read_all<S: Stream + ?Sized>(stream: &mut S) -> Result<Vec<u8>> {
    let size = stream.size()?;
    let mut data = vec![0u8; size as usize];
    stream.seek(0)?;
    stream.read(&mut data)?;
    Ok(data)
}
