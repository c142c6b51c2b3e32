// Copyright (c) 2025 the lamina authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Storage abstraction for sequential binary data access.
//!
//! Provides the [`Stream`] trait for reading binary data sequentially, with
//! implementations for in-memory buffers and (with the `std` feature)
//! seekable standard I/O types.

#[cfg(feature = "std")]
mod std;

use core::fmt;

/// Storage abstraction for the streamed reading of a module.
pub trait Stream {
    /// Error type for storage-specific failures.
    type Error: fmt::Debug;

    /// Whether the given error signifies a failure to read due to having
    /// reached the end of the stream.
    fn is_eof(err: &Self::Error) -> bool;

    /// Returns the current byte offset into the stream.
    fn offset(&mut self) -> usize;

    /// Reads a single byte from the stream.
    fn read_byte(&mut self) -> Result<u8, Self::Error>;

    /// Reads exactly `buf.len()` bytes into the provided buffer.
    ///
    /// Returns an error if EOF is reached or an I/O error occurs before the
    /// buffer is completely filled.
    ///
    /// Implementors should override for better performance.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        for byte in buf {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Skip the specified number of bytes in the stream.
    ///
    /// Implementors should override for better performance.
    fn skip_bytes(&mut self, count: usize) -> Result<(), Self::Error> {
        for _ in 0..count {
            self.read_byte()?;
        }
        Ok(())
    }

    /// Rewind the stream to a previously observed offset.
    ///
    /// The type section is decoded in two passes, so every stream must be
    /// able to return to an offset it has already reported via
    /// [`Stream::offset`]. Rewinding to any other offset may fail.
    fn reset(&mut self, offset: usize) -> Result<(), Self::Error>;
}

/// Represents attempting to read past the end of a buffer.
pub struct Truncated {}

impl fmt::Debug for Truncated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "truncated input")
    }
}

/// In-memory buffer implementation of [`Stream`].
pub struct Buffer<Bytes: AsRef<[u8]>> {
    bytes: Bytes,
    pos: usize,
}

impl<Bytes: AsRef<[u8]>> Buffer<Bytes> {
    /// Create a new buffer stream from the given bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl<Bytes: AsRef<[u8]>> Stream for Buffer<Bytes> {
    type Error = Truncated;

    fn is_eof(_: &Self::Error) -> bool {
        true
    }

    fn offset(&mut self) -> usize {
        self.pos
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let bytes = self.bytes.as_ref();
        if self.pos < bytes.len() {
            let byte = bytes[self.pos];
            self.pos += 1;
            Ok(byte)
        } else {
            Err(Truncated {})
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let bytes = self.bytes.as_ref();
        debug_assert!(self.pos <= bytes.len());
        if buf.len() <= bytes.len() - self.pos {
            buf.copy_from_slice(&bytes[self.pos..(self.pos + buf.len())]);
            self.pos += buf.len();
            Ok(())
        } else {
            Err(Truncated {})
        }
    }

    fn skip_bytes(&mut self, count: usize) -> Result<(), Self::Error> {
        let bytes = self.bytes.as_ref();
        debug_assert!(self.pos <= bytes.len());
        if count <= bytes.len() - self.pos {
            self.pos += count;
            Ok(())
        } else {
            Err(Truncated {})
        }
    }

    fn reset(&mut self, offset: usize) -> Result<(), Self::Error> {
        if offset <= self.bytes.as_ref().len() {
            self.pos = offset;
            Ok(())
        } else {
            Err(Truncated {})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_reads_sequentially() {
        let mut buffer = Buffer::new([0x01u8, 0x02, 0x03]);
        assert_eq!(buffer.offset(), 0);
        assert_eq!(buffer.read_byte().unwrap(), 0x01);
        let mut two = [0u8; 2];
        buffer.read_exact(&mut two).unwrap();
        assert_eq!(two, [0x02, 0x03]);
        assert_eq!(buffer.offset(), 3);
        assert!(buffer.read_byte().is_err());
    }

    #[test]
    fn buffer_resets_to_observed_offset() {
        let mut buffer = Buffer::new([0xAAu8, 0xBB, 0xCC]);
        buffer.skip_bytes(2).unwrap();
        let mark = buffer.offset();
        assert_eq!(buffer.read_byte().unwrap(), 0xCC);
        buffer.reset(mark).unwrap();
        assert_eq!(buffer.read_byte().unwrap(), 0xCC);
        buffer.reset(0).unwrap();
        assert_eq!(buffer.read_byte().unwrap(), 0xAA);
    }

    #[test]
    fn buffer_rejects_out_of_range_reset() {
        let mut buffer = Buffer::new([0u8; 4]);
        assert!(buffer.reset(5).is_err());
    }

    #[test]
    fn buffer_rejects_overlong_reads() {
        let mut buffer = Buffer::new([0u8; 2]);
        let mut buf = [0u8; 3];
        assert!(buffer.read_exact(&mut buf).is_err());
        assert!(buffer.skip_bytes(3).is_err());
    }
}
