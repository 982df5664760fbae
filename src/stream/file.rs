// File-backed stream.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::Stream;
use crate::error::Result;

/// A stream over an OS file. The cursor is the file's own position.
pub struct FileStream {
    file: File,
    offset: u64,
}

impl FileStream {
    /// Wrap an already-open file, starting at its current position.
    pub fn new(mut file: File) -> Result<Self> {
        let offset = file.stream_position()?;
        Ok(Self { file, offset })
    }

    /// Open an existing file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(File::open(path)?)
    }

    /// Open a file for writing, creating it if needed. Existing contents are
    /// kept so that extent-backed writers can patch in place.
    pub fn open_for_write(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::new(file)
    }

    /// Create (or truncate) a file for writing.
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(File::create(path)?)
    }

    pub fn into_inner(self) -> File {
        self.file
    }

    /// Re-read the cursor after a partial transfer. An unknown position
    /// reads as `u64::MAX`, which makes the next positioned access seek.
    fn resync(&mut self) {
        self.offset = self.file.stream_position().unwrap_or(u64::MAX);
    }
}

impl Stream for FileStream {
    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn offset(&self) -> Result<u64> {
        Ok(self.offset)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.offset = self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if let Err(e) = self.file.read_exact(buf) {
            self.resync();
            return Err(e.into());
        }
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if let Err(e) = self.file.write_all(buf) {
            self.resync();
            return Err(e.into());
        }
        self.offset += buf.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
