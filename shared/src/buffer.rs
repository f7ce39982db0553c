//! Growable byte buffer with transactional reads.
//!
//! A [`FrameBuffer`] holds a byte sequence plus two cursors: the read
//! position and a rollback mark, with `0 <= mark <= pos <= len` at all
//! times. Reads past the buffered data fail with
//! [`BufferError::InsufficientData`] and never move the cursor, so callers
//! can `mark()` before a command, try to decode it, and `rollback()` if the
//! rest of it has not arrived yet.
//!
//! All numeric fields are little-endian. Strings are a `u16` byte length
//! followed by that many Latin-1 bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Errors produced while decoding from a [`FrameBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// The read needs more bytes than are currently buffered.
    #[error("insufficient data: need {needed} bytes, {available} buffered")]
    InsufficientData { needed: usize, available: usize },
    /// The bytes are present but do not form a valid value.
    #[error("malformed data: {0}")]
    Malformed(String),
}

impl BufferError {
    pub fn is_insufficient(&self) -> bool {
        matches!(self, BufferError::InsufficientData { .. })
    }
}

macro_rules! le_accessors {
    ($($ty:ty => $peek:ident, $read:ident, $write:ident;)*) => {
        $(
            pub fn $peek(&self) -> Result<$ty, BufferError> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let mut raw = [0u8; WIDTH];
                raw.copy_from_slice(self.window(WIDTH)?);
                Ok(<$ty>::from_le_bytes(raw))
            }

            pub fn $read(&mut self) -> Result<$ty, BufferError> {
                let value = self.$peek()?;
                self.pos += std::mem::size_of::<$ty>();
                Ok(value)
            }

            pub fn $write(&mut self, value: $ty) {
                self.data.put_slice(&value.to_le_bytes());
            }
        )*
    };
}

/// Byte queue used for both directions of a connection.
///
/// Inbound buffers are appended to by the transport and drained by the
/// dispatch loop. Outbound buffers are written by command encoders and
/// emptied with [`FrameBuffer::take_all`].
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: BytesMut,
    pos: usize,
    mark: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            pos: 0,
            mark: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::with_capacity(bytes.len());
        buffer.append(bytes);
        buffer
    }

    /// Appends newly received bytes after everything already buffered.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Number of bytes not yet consumed.
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn mark_position(&self) -> usize {
        self.mark
    }

    /// Total bytes held, consumed or not.
    pub fn capacity_used(&self) -> usize {
        self.data.len()
    }

    /// The unread bytes.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    pub fn mark(&mut self) {
        self.mark = self.pos;
    }

    pub fn rollback(&mut self) {
        self.pos = self.mark;
    }

    /// Drops every byte before the read position and resets both cursors.
    ///
    /// Only call this between commands: a partially consumed command would
    /// lose its head.
    pub fn commit(&mut self) {
        if self.pos != 0 {
            self.data.advance(self.pos);
            self.pos = 0;
            self.mark = 0;
        }
    }

    /// Commits, then hands back every remaining byte and leaves the buffer empty.
    pub fn take_all(&mut self) -> Bytes {
        self.commit();
        self.data.split().freeze()
    }

    fn window(&self, width: usize) -> Result<&[u8], BufferError> {
        let available = self.len();
        if width > available {
            return Err(BufferError::InsufficientData {
                needed: width,
                available,
            });
        }
        Ok(&self.data[self.pos..self.pos + width])
    }

    le_accessors! {
        u8 => peek_u8, read_u8, write_u8;
        i8 => peek_i8, read_i8, write_i8;
        u16 => peek_u16, read_u16, write_u16;
        i16 => peek_i16, read_i16, write_i16;
        u32 => peek_u32, read_u32, write_u32;
        i32 => peek_i32, read_i32, write_i32;
        f32 => peek_f32, read_f32, write_f32;
        f64 => peek_f64, read_f64, write_f64;
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BufferError> {
        let bytes = self.window(count)?.to_vec();
        self.pos += count;
        Ok(bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), BufferError> {
        self.window(count)?;
        self.pos += count;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.put_slice(bytes);
    }

    /// Reads a length-prefixed string without consuming it.
    pub fn peek_string(&self) -> Result<String, BufferError> {
        let declared = usize::from(self.peek_u16()?);
        let framed = self.window(2 + declared)?;
        Ok(decode_latin1(&framed[2..]))
    }

    /// Reads a length-prefixed string.
    ///
    /// A declared length larger than what is buffered is an
    /// insufficient-data condition, not a malformed frame: the rest of the
    /// string may simply not have arrived yet.
    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let value = self.peek_string()?;
        let declared = usize::from(self.peek_u16()?);
        self.pos += 2 + declared;
        Ok(value)
    }

    /// Reads a fixed-width, NUL-padded string field.
    pub fn read_fixed_string(&mut self, width: usize) -> Result<String, BufferError> {
        let raw = self.read_bytes(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(decode_latin1(&raw[..end]).trim_end().to_string())
    }

    /// Writes a length-prefixed Latin-1 string. Characters outside Latin-1
    /// become `?`; anything past `u16::MAX` bytes is cut off.
    pub fn write_string(&mut self, value: &str) {
        let mut encoded = encode_latin1(value);
        encoded.truncate(usize::from(u16::MAX));
        self.write_u16(encoded.len() as u16);
        self.data.put_slice(&encoded);
    }
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub fn encode_latin1(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
