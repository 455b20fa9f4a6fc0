//! ttlkv - In-Memory Key-Value Store with TTL
//!
//! Concurrent map of string records that expire after a per-record TTL,
//! swept by a background evictor, with dump/load snapshots that keep each
//! record's remaining lifetime across the restore.

pub mod client;
pub mod error;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod storage;

pub use client::{ClientError, Driver, RecordView};
pub use error::{ServerError, StoreError};
pub use persistence::{Snapshot, SnapshotError};
pub use protocol::{Command, ErrorKind, Frame, FrameCodec, Response};
pub use server::{Config, Server};
pub use storage::{PutOutcome, Record, SharedStore, Store, StoreConfig};
