//! # Utils
//!
//! [`ByteWindow`] is the only way the parsers in this crate touch raw bytes.
//! A window borrows a region of the package, so re-slicing never copies and
//! a window can be handed to another thread as long as the backing buffer
//! outlives it. Each window owns its own cursor: two windows over the same
//! bytes never observe each other's reads.

use std::mem;

use crate::error::{Result, VerifyError};

/// Largest length prefix accepted by the v2 format (lengths are signed 32-bit on the wire)
const MAX_LENGTH_PREFIX: u32 = i32::MAX as u32;

/// Bounds-checked, zero-copy reader over a byte region
#[derive(Debug, Clone, Copy)]
pub struct ByteWindow<'a> {
    /// Region covered by the window
    data: &'a [u8],
    /// Position of the cursor inside the region
    pos: usize,
}

impl<'a> ByteWindow<'a> {
    /// Create a new window over `data`, cursor at the start
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Length of the whole window
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the window covers no bytes at all
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current cursor position
    pub const fn get_pos(&self) -> usize {
        self.pos
    }

    /// Bytes left between the cursor and the end of the window
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Whether the cursor has bytes left to read
    pub const fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// The full region, independent of the cursor
    pub const fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Re-slice the window to `[start, end)`, without moving this window's cursor.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if the range is outside the window.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        match self.data.get(start..end) {
            Some(data) => Ok(Self::new(data)),
            None => Err(VerifyError::SignerParse(format!(
                "slice {}..{} out of bounds (len: {})",
                start,
                end,
                self.data.len()
            ))),
        }
    }

    /// Take the next `len` bytes and advance the cursor.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if fewer than `len` bytes remain.
    pub fn get_to(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            VerifyError::SignerParse(format!("position overflow: {} + {}", self.pos, len))
        })?;
        match self.data.get(self.pos..end) {
            Some(data) => {
                self.pos = end;
                Ok(data)
            }
            None => Err(VerifyError::SignerParse(format!(
                "out of bounds: {}..{} (len: {})",
                self.pos,
                end,
                self.data.len()
            ))),
        }
    }

    /// Read a little-endian u32.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        let buf = self.get_to(mem::size_of::<u32>())?;
        Ok(u32::from_le_bytes(create_fixed_buffer_4(buf)))
    }

    /// Read a little-endian u64.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64> {
        let buf = self.get_to(mem::size_of::<u64>())?;
        Ok(u64::from_le_bytes(create_fixed_buffer_8(buf)))
    }

    /// Read a u32 length prefix and check it against the remaining bytes.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] if the length is negative as a
    /// signed 32-bit value or larger than what is left in the window.
    pub fn read_size(&mut self) -> Result<usize> {
        let size = self.read_u32()?;
        if size > MAX_LENGTH_PREFIX {
            return Err(VerifyError::SignerParse(format!(
                "negative length prefix: {}",
                size as i32
            )));
        }
        let size = size as usize;
        if size > self.remaining() {
            return Err(VerifyError::SignerParse(format!(
                "length prefix {} exceeds remaining {} bytes",
                size,
                self.remaining()
            )));
        }
        Ok(size)
    }

    /// Read a length-prefixed field as a new window with its own cursor.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] on a malformed length prefix.
    pub fn length_prefixed_slice(&mut self) -> Result<Self> {
        let size = self.read_size()?;
        Ok(Self::new(self.get_to(size)?))
    }

    /// Read a length-prefixed field as raw bytes.
    /// # Errors
    /// Returns [`VerifyError::SignerParse`] on a malformed length prefix.
    pub fn length_prefixed_bytes(&mut self) -> Result<&'a [u8]> {
        let size = self.read_size()?;
        self.get_to(size)
    }

    /// Iterate over the window in chunks of at most `chunk_size` bytes.
    ///
    /// An empty window yields no chunk; a non-empty window never yields an
    /// empty chunk.
    pub fn chunks(&self, chunk_size: usize) -> impl Iterator<Item = &'a [u8]> {
        self.data.chunks(chunk_size.max(1))
    }
}

/// Create a fixed buffer of 2 bytes
pub(crate) fn create_fixed_buffer_2(buf: &[u8]) -> [u8; 2] {
    let mut buffer = [0; 2];
    for (dst, src) in buffer.iter_mut().zip(buf) {
        *dst = *src;
    }
    buffer
}

/// Create a fixed buffer of 4 bytes
pub(crate) fn create_fixed_buffer_4(buf: &[u8]) -> [u8; 4] {
    let mut buffer = [0; 4];
    for (dst, src) in buffer.iter_mut().zip(buf) {
        *dst = *src;
    }
    buffer
}

/// Create a fixed buffer of 8 bytes
pub(crate) fn create_fixed_buffer_8(buf: &[u8]) -> [u8; 8] {
    let mut buffer = [0; 8];
    for (dst, src) in buffer.iter_mut().zip(buf) {
        *dst = *src;
    }
    buffer
}
