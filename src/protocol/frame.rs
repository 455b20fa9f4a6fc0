//! Frame Structure
//!
//! Binary frame with a fixed 20-byte header followed by the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

/// Magic bytes opening every frame: "TTKV"
pub const MAGIC: [u8; 4] = *b"TTKV";

/// Protocol version
pub const VERSION: u8 = 1;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 20;

/// Operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Requests
    Ping = 0x01,
    Get = 0x03,
    Set = 0x04,
    Del = 0x05,
    Valid = 0x06,
    Dump = 0x07,
    Load = 0x08,

    // Responses
    Pong = 0x02,
    Created = 0x10,
    Updated = 0x11,
    Record = 0x12,
    Nil = 0x13,
    Removed = 0x14,
    Bool = 0x15,
    Snapshot = 0x16,
    Loaded = 0x17,
    Error = 0x1F,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(OpCode::Ping),
            0x02 => Some(OpCode::Pong),
            0x03 => Some(OpCode::Get),
            0x04 => Some(OpCode::Set),
            0x05 => Some(OpCode::Del),
            0x06 => Some(OpCode::Valid),
            0x07 => Some(OpCode::Dump),
            0x08 => Some(OpCode::Load),
            0x10 => Some(OpCode::Created),
            0x11 => Some(OpCode::Updated),
            0x12 => Some(OpCode::Record),
            0x13 => Some(OpCode::Nil),
            0x14 => Some(OpCode::Removed),
            0x15 => Some(OpCode::Bool),
            0x16 => Some(OpCode::Snapshot),
            0x17 => Some(OpCode::Loaded),
            0x1F => Some(OpCode::Error),
            _ => None,
        }
    }
}

/// Frame header (20 bytes)
///
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬────────────────┬─────────────┐
/// │  Magic   │ Version  │  OpCode  │  Flags   │  Request ID    │ Payload Len │
/// │ (4 bytes)│ (1 byte) │ (1 byte) │ (2 bytes)│  (8 bytes)     │  (4 bytes)  │
/// └──────────┴──────────┴──────────┴──────────┴────────────────┴─────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub opcode: OpCode,
    pub flags: u16,
    pub request_id: u64,
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn new(opcode: OpCode, request_id: u64) -> Self {
        Self {
            version: VERSION,
            opcode,
            flags: 0,
            request_id,
            payload_len: 0,
        }
    }

    pub fn with_payload_len(mut self, len: u32) -> Self {
        self.payload_len = len;
        self
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.flags);
        buf.put_u64(self.request_id);
        buf.put_u32(self.payload_len);
    }

    /// Decode a header; the caller guarantees `HEADER_SIZE` readable bytes
    pub fn decode(buf: &mut impl Buf) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let version = buf.get_u8();
        if version != VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported protocol version: {}", version),
            ));
        }
        let opcode_byte = buf.get_u8();
        let opcode = OpCode::from_u8(opcode_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid opcode: {:#04x}", opcode_byte),
            )
        })?;

        Ok(Self {
            version,
            opcode,
            flags: buf.get_u16(),
            request_id: buf.get_u64(),
            payload_len: buf.get_u32(),
        })
    }
}

/// Header plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Payloads longer than `u32::MAX` get a saturated header length;
    /// [`FrameCodec`](super::FrameCodec) refuses to send them.
    pub fn new(opcode: OpCode, request_id: u64, payload: Bytes) -> Self {
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        let header = FrameHeader::new(opcode, request_id).with_payload_len(payload_len);
        Self { header, payload }
    }

    pub fn empty(opcode: OpCode, request_id: u64) -> Self {
        Self::new(opcode, request_id, Bytes::new())
    }

    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    pub fn request_id(&self) -> u64 {
        self.header.request_id
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_slice(&self.payload);
    }
}

/// Append a u32 length-prefixed string.
///
/// A string past `u32::MAX` bytes gets a saturated prefix, but the payload
/// holding it is then too large for [`FrameCodec`](super::FrameCodec) to send.
pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u32(u32::try_from(s.len()).unwrap_or(u32::MAX));
    buf.put_slice(s.as_bytes());
}

/// Read a u32 length-prefixed UTF-8 string
pub(crate) fn get_string(buf: &mut Bytes, what: &str) -> io::Result<String> {
    if buf.remaining() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Not enough data for {} length", what),
        ));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Not enough data for {}", what),
        ));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not valid UTF-8", what),
        )
    })
}
