//! Wire Protocol
//!
//! Length-prefixed binary frames carrying store commands and their results.

mod codec;
mod command;
mod frame;
mod response;

pub use codec::{FrameCodec, DEFAULT_MAX_PAYLOAD};
pub use command::Command;
pub use frame::{Frame, FrameHeader, OpCode, HEADER_SIZE, MAGIC, VERSION};
pub use response::{ErrorKind, Response};
