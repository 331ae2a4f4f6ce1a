//! Little-endian packet reader and writer.
//!
//! [`NetworkMessage`] walks an inbound frame with a cursor; every getter
//! reports truncation instead of panicking so a malformed packet can be
//! discarded at the dispatch boundary. [`OutputMessage`] builds an outbound
//! frame body.
//!
//! Primitive encodings:
//!
//! | value     | encoding                                   |
//! |-----------|--------------------------------------------|
//! | integers  | little-endian, fixed width                 |
//! | string    | `u16` byte length followed by the bytes    |
//! | position  | `u16 x`, `u16 y`, `u8 z`                   |

use std::fmt;

/// Errors raised while decoding an inbound packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The packet ended before the requested field.
    #[error("packet truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Bytes the field required.
        needed: usize,
        /// Cursor position when the read was attempted.
        offset: usize,
        /// Bytes left after the cursor.
        available: usize,
    },

    /// A string field is longer than the caller allows.
    #[error("string of {len} bytes exceeds limit {max}")]
    StringTooLong {
        /// Declared string length.
        len: usize,
        /// Caller-imposed limit.
        max: usize,
    },
}

/// A map coordinate as the client addresses it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Position {
    /// West-east coordinate.
    pub x: u16,
    /// North-south coordinate.
    pub y: u16,
    /// Floor, 0 is the highest.
    pub z: u8,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Cursor over an inbound frame payload.
#[derive(Debug, Clone)]
pub struct NetworkMessage {
    buffer: Vec<u8>,
    position: usize,
}

impl NetworkMessage {
    /// Wraps a frame payload, cursor at the first byte.
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Current cursor offset.
    pub fn offset(&self) -> usize {
        self.position
    }

    /// Whole payload, independent of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn take(&mut self, needed: usize) -> Result<&[u8], MessageError> {
        if self.remaining() < needed {
            return Err(MessageError::Truncated {
                needed,
                offset: self.position,
                available: self.remaining(),
            });
        }
        let start = self.position;
        self.position += needed;
        Ok(&self.buffer[start..self.position])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn get_byte(&mut self) -> Result<u8, MessageError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn get_u16(&mut self) -> Result<u16, MessageError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Reads a little-endian `u32`.
    pub fn get_u32(&mut self) -> Result<u32, MessageError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Reads a little-endian `u64`.
    pub fn get_u64(&mut self) -> Result<u64, MessageError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Reads a length-prefixed string. Invalid UTF-8 is replaced rather
    /// than rejected; clients send Latin-1 names.
    pub fn get_string(&mut self) -> Result<String, MessageError> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads a length-prefixed string, rejecting anything longer than `max`.
    pub fn get_string_limited(&mut self, max: usize) -> Result<String, MessageError> {
        let len = self.get_u16()? as usize;
        if len > max {
            return Err(MessageError::StringTooLong { len, max });
        }
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads a map position.
    pub fn get_position(&mut self) -> Result<Position, MessageError> {
        Ok(Position {
            x: self.get_u16()?,
            y: self.get_u16()?,
            z: self.get_byte()?,
        })
    }

    /// Advances the cursor without interpreting the bytes.
    pub fn skip_bytes(&mut self, count: usize) -> Result<(), MessageError> {
        self.take(count).map(|_| ())
    }
}

/// Builder for an outbound frame body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputMessage {
    buffer: Vec<u8>,
}

impl OutputMessage {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message whose first byte is `opcode`.
    pub fn with_opcode(opcode: u8) -> Self {
        let mut msg = Self::new();
        msg.add_byte(opcode);
        msg
    }

    /// Appends one byte.
    pub fn add_byte(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Appends a little-endian `u16`.
    pub fn add_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u32`.
    pub fn add_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian `u64`.
    pub fn add_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a length-prefixed string, truncated to `u16::MAX` bytes.
    pub fn add_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.add_u16(len as u16);
        self.buffer.extend_from_slice(&bytes[..len]);
    }

    /// Appends a map position.
    pub fn add_position(&mut self, pos: Position) {
        self.add_u16(pos.x);
        self.add_u16(pos.y);
        self.add_byte(pos.z);
    }

    /// Appends `count` filler bytes (`0x33`).
    pub fn add_padding(&mut self, count: usize) {
        self.buffer.resize(self.buffer.len() + count, 0x33);
    }

    /// Appends raw bytes verbatim.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Length of the body written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Body written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the builder, returning the body.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}
