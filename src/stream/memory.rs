// Memory-backed streams.
//
// A read stream borrows a fixed slice; a write stream appends to (or
// overwrites inside) a caller-owned Vec, growing it as needed.

use super::Stream;
use crate::error::{Result, insufficient_input, invalid, unsupported};

enum Backing<'a> {
    Read(&'a [u8]),
    Write(&'a mut Vec<u8>),
}

pub struct MemoryStream<'a> {
    backing: Backing<'a>,
    offset: u64,
}

impl<'a> MemoryStream<'a> {
    /// Read-only stream over `data`.
    pub fn for_read(data: &'a [u8]) -> Self {
        Self {
            backing: Backing::Read(data),
            offset: 0,
        }
    }

    /// Write-only stream into `data`, starting at offset zero. Existing
    /// contents are overwritten as the cursor passes them.
    pub fn for_write(data: &'a mut Vec<u8>) -> Self {
        Self {
            backing: Backing::Write(data),
            offset: 0,
        }
    }

    fn len(&self) -> u64 {
        match &self.backing {
            Backing::Read(d) => d.len() as u64,
            Backing::Write(d) => d.len() as u64,
        }
    }
}

impl Stream for MemoryStream<'_> {
    fn size(&self) -> Result<u64> {
        Ok(self.len())
    }

    fn offset(&self) -> Result<u64> {
        Ok(self.offset)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len() {
            return Err(invalid(format!(
                "seek to {offset} past end of {}-byte buffer",
                self.len()
            )));
        }
        self.offset = offset;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let Backing::Read(data) = &self.backing else {
            return Err(unsupported("read from write-only memory stream"));
        };
        let start = self.offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(insufficient_input(format!(
                "read of {} bytes at {start} exceeds {}-byte buffer",
                buf.len(),
                data.len()
            )));
        }
        buf.copy_from_slice(&data[start..end]);
        self.offset = end as u64;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let Backing::Write(data) = &mut self.backing else {
            return Err(unsupported("write to read-only memory stream"));
        };
        let start = self.offset as usize;
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.offset = end as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn read_is_bounds_checked() {
        let data = [1u8, 2, 3, 4, 5];
        let mut s = MemoryStream::for_read(&data);
        let mut buf = [0u8; 3];
        s.seek(2).unwrap();
        s.read(&mut buf).unwrap();
        assert_eq!(buf, [3, 4, 5]);
        s.seek(3).unwrap();
        assert_eq!(s.read(&mut buf).unwrap_err().kind(), ErrorKind::InsufficientInput);
        assert!(s.seek(6).is_err());
        assert_eq!(s.write(b"x").unwrap_err().kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn write_grows_and_overwrites() {
        let mut out = Vec::new();
        {
            let mut s = MemoryStream::for_write(&mut out);
            s.write(b"abcdef").unwrap();
            s.seek(2).unwrap();
            s.write(b"XY").unwrap();
            assert_eq!(s.offset().unwrap(), 4);
            let mut buf = [0u8; 1];
            assert_eq!(s.read(&mut buf).unwrap_err().kind(), ErrorKind::Unsupported);
        }
        assert_eq!(out, b"abXYef");
    }
}
