//! Forward-only readers with exact byte accounting

use crate::archive::error::{FormatError, FormatResult};
use std::io::{self, BufRead, BufReader, Read};

/// Buffered reader that tracks how many bytes have been consumed
///
/// The position is the offset of the next unread byte in the logical stream,
/// which is what entry extents are measured against. Bytes sitting in the
/// buffer but not yet consumed do not count.
pub struct PositionedReader<R: Read> {
    inner: BufReader<R>,
    position: u64,
}

impl<R: Read> PositionedReader<R> {
    /// Wrap a reader with the given buffer capacity
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity, reader),
            position: 0,
        }
    }

    /// Offset of the next unread byte
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Fill `buf` completely, reporting a truncated record on early EOF
    pub fn read_record(&mut self, buf: &mut [u8], context: &'static str) -> FormatResult<()> {
        let offset = self.position;
        self.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                FormatError::Truncated { offset, context }
            } else {
                FormatError::Io(e)
            }
        })
    }

    /// Read a little-endian `u32`, or `None` at a clean end of stream
    pub fn read_signature(&mut self) -> FormatResult<Option<u32>> {
        if self.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let mut bytes = [0u8; 4];
        self.read_record(&mut bytes, "record signature")?;
        Ok(Some(u32::from_le_bytes(bytes)))
    }

    /// Consume everything that is left, returning the number of bytes skipped
    pub fn drain(&mut self) -> FormatResult<u64> {
        Ok(io::copy(self, &mut io::sink())?)
    }

    /// Skip exactly `count` bytes
    pub fn skip(&mut self, count: u64, context: &'static str) -> FormatResult<()> {
        let offset = self.position;
        let skipped = io::copy(&mut self.by_ref().take(count), &mut io::sink())?;
        if skipped < count {
            return Err(FormatError::Truncated {
                offset: offset + skipped,
                context,
            });
        }
        Ok(())
    }
}

impl<R: Read> Read for PositionedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: Read> BufRead for PositionedReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.position += amt as u64;
    }
}

/// Reader limited to one entry's byte extent
///
/// Yields at most `extent` bytes from the inner reader. [`finish`](Self::finish)
/// reports a short extent as a size mismatch, and in strict mode also reports
/// any byte the source still has beyond the extent. Strict mode is for range
/// fetches, where the source should end exactly at the extent boundary.
pub struct ExtentReader<R: BufRead> {
    inner: R,
    entry: String,
    extent: u64,
    remaining: u64,
    strict_end: bool,
}

impl<R: BufRead> ExtentReader<R> {
    /// Limit `inner` to `extent` bytes of the named entry
    pub fn new(inner: R, entry: &str, extent: u64) -> Self {
        Self {
            inner,
            entry: entry.to_string(),
            extent,
            remaining: extent,
            strict_end: false,
        }
    }

    /// Also fail if the source has bytes past the extent
    pub fn strict(mut self) -> Self {
        self.strict_end = true;
        self
    }

    /// Bytes of the extent not yet consumed
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Verify the extent was consumed exactly and return the inner reader
    pub fn finish(mut self) -> FormatResult<R> {
        if self.remaining > 0 {
            return Err(FormatError::SizeMismatch {
                entry: self.entry,
                what: "compressed",
                declared: self.extent,
                actual: self.extent - self.remaining,
            });
        }
        if self.strict_end && !self.inner.fill_buf()?.is_empty() {
            return Err(FormatError::ExtentOverrun {
                entry: self.entry,
                extent: self.extent,
            });
        }
        Ok(self.inner)
    }
}

impl<R: BufRead> Read for ExtentReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for ExtentReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let remaining = self.remaining;
        if remaining == 0 {
            return Ok(&[]);
        }
        let available = self.inner.fill_buf()?;
        let n = usize::try_from(remaining).map_or(available.len(), |r| r.min(available.len()));
        Ok(&available[..n])
    }

    fn consume(&mut self, amt: usize) {
        let amt = usize::try_from(self.remaining).map_or(amt, |r| r.min(amt));
        self.inner.consume(amt);
        self.remaining -= amt as u64;
    }
}
