//! Frame Codec for Tokio
//!
//! Implements Encoder and Decoder traits for framed I/O.

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{Frame, FrameHeader, HEADER_SIZE};

/// Largest payload accepted by default (256 MiB), large enough for dumps
pub const DEFAULT_MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Tokio codec for protocol frames
#[derive(Debug)]
pub struct FrameCodec {
    state: DecodeState,
    max_payload: usize,
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Header,
    Payload(FrameHeader),
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Limit is capped at `u32::MAX`, the largest length a header carries
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_payload: max_payload.min(u32::MAX as usize),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &self.state {
                DecodeState::Header => {
                    if src.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = FrameHeader::decode(&mut src.split_to(HEADER_SIZE).freeze())?;
                    let payload_len = header.payload_len as usize;
                    if payload_len > self.max_payload {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "Payload of {} bytes exceeds limit of {}",
                                payload_len, self.max_payload
                            ),
                        ));
                    }

                    src.reserve(payload_len);
                    self.state = DecodeState::Payload(header);
                }

                DecodeState::Payload(header) => {
                    let payload_len = header.payload_len as usize;

                    if src.len() < payload_len {
                        return Ok(None);
                    }

                    let payload = src.split_to(payload_len).freeze();
                    let frame = Frame {
                        header: header.clone(),
                        payload,
                    };

                    self.state = DecodeState::Header;
                    return Ok(Some(frame));
                }
            }
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload.len() > self.max_payload {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Payload of {} bytes exceeds limit of {}",
                    item.payload.len(),
                    self.max_payload
                ),
            ));
        }
        dst.reserve(HEADER_SIZE + item.payload.len());
        item.encode(dst);
        Ok(())
    }
}
