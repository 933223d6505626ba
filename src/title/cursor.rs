// title/cursor.rs from wadkit (c) 2025 NinjaCheetah & Contributors
//
// Implements the big-endian reader and writer that every title structure is parsed and dumped with.

use std::io::{Cursor, Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;
use crate::title::ErrorClass;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("read of {needed} bytes at offset {offset:#x} runs past the end of the data ({available} bytes available)")]
    OutOfBounds { offset: usize, needed: usize, available: usize },
}

impl CursorError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::MalformedInput
    }
}

/// Rounds a value up to the next multiple of a power-of-two boundary.
pub fn align_up(value: usize, boundary: usize) -> usize {
    debug_assert!(boundary.is_power_of_two());
    (value + boundary - 1) & !(boundary - 1)
}

/// A bounds-checked big-endian reader over a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    /// Creates a new ByteReader positioned at the start of the data.
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { buf: Cursor::new(data) }
    }

    /// Creates a new ByteReader positioned at the specified offset.
    pub fn at(data: &'a [u8], offset: usize) -> Self {
        let mut reader = Self::new(data);
        reader.seek(offset);
        reader
    }

    pub fn position(&self) -> usize {
        self.buf.position() as usize
    }

    pub fn len(&self) -> usize {
        self.buf.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.get_ref().is_empty()
    }

    /// Gets the number of bytes left between the current position and the end of the data.
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    /// Moves to an absolute offset. Moving past the end is allowed, but any following read will
    /// fail.
    pub fn seek(&mut self, offset: usize) {
        self.buf.set_position(offset as u64);
    }

    pub fn skip(&mut self, count: usize) {
        let target = self.position() + count;
        self.seek(target);
    }

    /// Skips forward to the next multiple of the boundary. The skipped bytes are not inspected.
    pub fn align(&mut self, boundary: usize) {
        let target = align_up(self.position(), boundary);
        self.seek(target);
    }

    fn ensure(&self, needed: usize) -> Result<(), CursorError> {
        if self.position().checked_add(needed).is_none_or(|end| end > self.len()) {
            return Err(CursorError::OutOfBounds {
                offset: self.position(),
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    fn out_of_bounds(&self, needed: usize) -> CursorError {
        CursorError::OutOfBounds { offset: self.position(), needed, available: self.remaining() }
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        self.ensure(1)?;
        self.buf.read_u8().map_err(|_| self.out_of_bounds(1))
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        self.ensure(2)?;
        self.buf.read_u16::<BigEndian>().map_err(|_| self.out_of_bounds(2))
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        self.ensure(4)?;
        self.buf.read_u32::<BigEndian>().map_err(|_| self.out_of_bounds(4))
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        self.ensure(8)?;
        self.buf.read_u64::<BigEndian>().map_err(|_| self.out_of_bounds(8))
    }

    /// Reads a fixed-length byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.buf.read_exact(&mut out).map_err(|_| self.out_of_bounds(N))?;
        Ok(out)
    }

    /// Reads the specified number of bytes into a new vector.
    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, CursorError> {
        self.ensure(len)?;
        let mut out = vec![0u8; len];
        self.buf.read_exact(&mut out).map_err(|_| self.out_of_bounds(len))?;
        Ok(out)
    }

    /// Reads a NUL-padded string occupying exactly `len` bytes. Anything after the first NUL is
    /// dropped.
    pub fn read_fixed_str(&mut self, len: usize) -> Result<String, CursorError> {
        let raw = self.read_vec(len)?;
        Ok(fixed_str(&raw))
    }
}

/// Converts a NUL-padded byte field into a string.
pub fn fixed_str(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// A big-endian writer that builds up a new byte buffer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        ByteWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ByteWriter { buf: Vec::with_capacity(capacity) }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), std::io::Error> {
        self.buf.write_u8(value)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), std::io::Error> {
        self.buf.write_u16::<BigEndian>(value)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), std::io::Error> {
        self.buf.write_u32::<BigEndian>(value)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), std::io::Error> {
        self.buf.write_u64::<BigEndian>(value)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.buf.write_all(data)
    }

    /// Writes a string into a field of exactly `len` bytes, NUL-padding whatever it doesn't fill.
    pub fn write_fixed_str(&mut self, value: &str, len: usize) -> Result<(), std::io::Error> {
        if value.len() > len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("string of {} bytes does not fit in a {} byte field", value.len(), len),
            ));
        }
        self.buf.write_all(value.as_bytes())?;
        self.zero_fill(len - value.len());
        Ok(())
    }

    pub fn zero_fill(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// Zero-fills up to the next multiple of the boundary.
    pub fn align(&mut self, boundary: usize) {
        self.buf.resize(align_up(self.buf.len(), boundary), 0);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
