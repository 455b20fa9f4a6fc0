//! Request Commands
//!
//! Parses request payloads from frames and encodes them back.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

use super::frame::{get_string, put_string, Frame, OpCode};

const SET_HAS_VALUE: u8 = 0b01;
const SET_HAS_TTL: u8 = 0b10;

/// Parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connection test
    Ping,

    /// Get a valid record
    Get { key: String },

    /// Put a value with optional TTL in milliseconds.
    /// A missing value is rejected by the server as an invalid argument.
    Set {
        key: String,
        value: Option<String>,
        ttl_ms: Option<i64>,
    },

    /// Remove a key
    Del { key: String },

    /// Check whether a key holds a valid record
    Valid { key: String },

    /// Snapshot the whole store
    Dump,

    /// Replace the store with a snapshot blob
    Load { blob: Bytes },
}

impl Command {
    /// Parse command from a frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        let mut payload = frame.payload.clone();
        match frame.header.opcode {
            OpCode::Ping => Ok(Command::Ping),
            OpCode::Dump => Ok(Command::Dump),

            OpCode::Get => Ok(Command::Get {
                key: get_string(&mut payload, "key")?,
            }),

            OpCode::Del => Ok(Command::Del {
                key: get_string(&mut payload, "key")?,
            }),

            OpCode::Valid => Ok(Command::Valid {
                key: get_string(&mut payload, "key")?,
            }),

            OpCode::Set => {
                if !payload.has_remaining() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Not enough data for SET flags",
                    ));
                }
                let flags = payload.get_u8();
                let key = get_string(&mut payload, "key")?;
                let value = if flags & SET_HAS_VALUE != 0 {
                    Some(get_string(&mut payload, "value")?)
                } else {
                    None
                };
                let ttl_ms = if flags & SET_HAS_TTL != 0 {
                    if payload.remaining() < 8 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "Not enough data for TTL",
                        ));
                    }
                    Some(payload.get_i64())
                } else {
                    None
                };
                Ok(Command::Set { key, value, ttl_ms })
            }

            OpCode::Load => Ok(Command::Load { blob: payload }),

            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for command: {:?}", frame.header.opcode),
            )),
        }
    }

    /// Encode into a frame
    pub fn to_frame(&self, request_id: u64) -> Frame {
        let (opcode, payload) = self.encode();
        Frame::new(opcode, request_id, payload)
    }

    /// Encode command to opcode and payload bytes
    pub fn encode(&self) -> (OpCode, Bytes) {
        match self {
            Command::Ping => (OpCode::Ping, Bytes::new()),
            Command::Dump => (OpCode::Dump, Bytes::new()),
            Command::Get { key } => (OpCode::Get, Self::key_payload(key)),
            Command::Del { key } => (OpCode::Del, Self::key_payload(key)),
            Command::Valid { key } => (OpCode::Valid, Self::key_payload(key)),

            Command::Set { key, value, ttl_ms } => {
                let mut flags = 0;
                if value.is_some() {
                    flags |= SET_HAS_VALUE;
                }
                if ttl_ms.is_some() {
                    flags |= SET_HAS_TTL;
                }

                let mut buf = BytesMut::new();
                buf.put_u8(flags);
                put_string(&mut buf, key);
                if let Some(value) = value {
                    put_string(&mut buf, value);
                }
                if let Some(ttl) = ttl_ms {
                    buf.put_i64(*ttl);
                }
                (OpCode::Set, buf.freeze())
            }

            Command::Load { blob } => (OpCode::Load, blob.clone()),
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Del { .. } => "DEL",
            Command::Valid { .. } => "VALID",
            Command::Dump => "DUMP",
            Command::Load { .. } => "LOAD",
        }
    }

    fn key_payload(key: &str) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + key.len());
        put_string(&mut buf, key);
        buf.freeze()
    }
}
