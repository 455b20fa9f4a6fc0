//! Response types
//!
//! Results of command execution as sent back to clients.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::io;

use super::frame::{get_string, put_string, Frame, OpCode};

/// Category of an error response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    /// Missing or empty key/value
    InvalidArgument = 1,
    /// Snapshot could not be restored; the previous store is still live
    LoadFailed = 2,
    /// Malformed request
    Protocol = 3,
    /// Store could not be encoded into a snapshot
    DumpFailed = 4,
}

impl ErrorKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ErrorKind::InvalidArgument),
            2 => Some(ErrorKind::LoadFailed),
            3 => Some(ErrorKind::Protocol),
            4 => Some(ErrorKind::DumpFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidArgument => write!(f, "invalid argument"),
            ErrorKind::LoadFailed => write!(f, "load failed"),
            ErrorKind::Protocol => write!(f, "protocol error"),
            ErrorKind::DumpFailed => write!(f, "dump failed"),
        }
    }
}

/// Response to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply to PING
    Pong,

    /// Put stored a new key
    Created,

    /// Put replaced a valid record
    Updated,

    /// Valid record with its remaining TTL
    Record { value: String, ttl_ms: i64 },

    /// Key missing or expired
    Nil,

    /// Key removed, carrying the removed value
    Removed { value: String },

    /// Boolean answer (VALID)
    Bool(bool),

    /// Snapshot blob (DUMP)
    Snapshot(Bytes),

    /// Store replaced (LOAD)
    Loaded,

    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    /// Convert response to a frame
    pub fn to_frame(&self, request_id: u64) -> Frame {
        match self {
            Response::Pong => Frame::empty(OpCode::Pong, request_id),
            Response::Created => Frame::empty(OpCode::Created, request_id),
            Response::Updated => Frame::empty(OpCode::Updated, request_id),
            Response::Nil => Frame::empty(OpCode::Nil, request_id),
            Response::Loaded => Frame::empty(OpCode::Loaded, request_id),

            Response::Record { value, ttl_ms } => {
                let mut buf = BytesMut::with_capacity(8 + 4 + value.len());
                buf.put_i64(*ttl_ms);
                put_string(&mut buf, value);
                Frame::new(OpCode::Record, request_id, buf.freeze())
            }

            Response::Removed { value } => {
                let mut buf = BytesMut::with_capacity(4 + value.len());
                put_string(&mut buf, value);
                Frame::new(OpCode::Removed, request_id, buf.freeze())
            }

            Response::Bool(b) => {
                Frame::new(OpCode::Bool, request_id, Bytes::from(vec![u8::from(*b)]))
            }

            Response::Snapshot(blob) => Frame::new(OpCode::Snapshot, request_id, blob.clone()),

            Response::Error { kind, message } => {
                let mut buf = BytesMut::with_capacity(1 + message.len());
                buf.put_u8(*kind as u8);
                buf.put_slice(message.as_bytes());
                Frame::new(OpCode::Error, request_id, buf.freeze())
            }
        }
    }

    /// Parse response from a frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        let mut payload = frame.payload.clone();
        match frame.header.opcode {
            OpCode::Pong => Ok(Response::Pong),
            OpCode::Created => Ok(Response::Created),
            OpCode::Updated => Ok(Response::Updated),
            OpCode::Nil => Ok(Response::Nil),
            OpCode::Loaded => Ok(Response::Loaded),

            OpCode::Record => {
                if payload.remaining() < 8 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Not enough data for record TTL",
                    ));
                }
                let ttl_ms = payload.get_i64();
                let value = get_string(&mut payload, "value")?;
                Ok(Response::Record { value, ttl_ms })
            }

            OpCode::Removed => Ok(Response::Removed {
                value: get_string(&mut payload, "value")?,
            }),

            OpCode::Bool => match payload.first() {
                Some(b) => Ok(Response::Bool(*b != 0)),
                None => Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Empty boolean payload",
                )),
            },

            OpCode::Snapshot => Ok(Response::Snapshot(payload)),

            OpCode::Error => {
                if !payload.has_remaining() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "Empty error payload",
                    ));
                }
                let kind_byte = payload.get_u8();
                let kind = ErrorKind::from_u8(kind_byte).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Unknown error kind: {}", kind_byte),
                    )
                })?;
                let message = String::from_utf8_lossy(&payload).into_owned();
                Ok(Response::Error { kind, message })
            }

            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for response: {:?}", frame.header.opcode),
            )),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Pong => write!(f, "PONG"),
            Response::Created => write!(f, "CREATED"),
            Response::Updated => write!(f, "UPDATED"),
            Response::Record { value, ttl_ms } => write!(f, "\"{}\" (ttl {} ms)", value, ttl_ms),
            Response::Nil => write!(f, "(nil)"),
            Response::Removed { value } => write!(f, "removed \"{}\"", value),
            Response::Bool(b) => write!(f, "{}", b),
            Response::Snapshot(blob) => write!(f, "(snapshot, {} bytes)", blob.len()),
            Response::Loaded => write!(f, "LOADED"),
            Response::Error { kind, message } => write!(f, "(error) {}: {}", kind, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carrying_responses() {
        for response in [
            Response::Record {
                value: "myValue".to_string(),
                ttl_ms: 59_998,
            },
            Response::Removed {
                value: String::new(),
            },
            Response::Bool(true),
            Response::Snapshot(Bytes::from_static(b"TKVS\x01")),
            Response::error(ErrorKind::LoadFailed, "snapshot truncated while reading key"),
        ] {
            let frame = response.to_frame(3);
            assert_eq!(frame.request_id(), 3);
            assert_eq!(Response::from_frame(&frame).unwrap(), response);
        }
    }

    #[test]
    fn test_command_opcode_is_not_a_response() {
        let frame = Frame::empty(OpCode::Get, 1);
        assert!(Response::from_frame(&frame).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Response::Nil.to_string(), "(nil)");
        assert_eq!(
            Response::error(ErrorKind::InvalidArgument, "key is empty").to_string(),
            "(error) invalid argument: key is empty"
        );
    }
}
