//! Snapshot Blob
//!
//! Self-describing binary encoding of a whole store plus the wall-clock
//! instant it was taken at. Restoring shifts every expiration by the time
//! elapsed since that instant, so remaining TTLs survive the round trip.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::storage::Record;

/// Snapshot blob format:
/// - Magic: 4 bytes "TKVS"
/// - Version: 1 byte
/// - Reference time: 8 bytes (i64 unix millis at dump time)
/// - Entry count: 4 bytes
/// - Entries: [key_len (4) + key + value_len (4) + value + expires_at (8)]*
///
/// All integers are big-endian.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"TKVS";
pub const SNAPSHOT_VERSION: u8 = 1;

const HEADER_LEN: usize = 4 + 1 + 8 + 4;

/// Reasons a blob could not be decoded
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("invalid snapshot magic")]
    BadMagic,

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u8),

    #[error("snapshot truncated while reading {0}")]
    Truncated(&'static str),

    #[error("snapshot contains non UTF-8 text")]
    InvalidUtf8,

    #[error("{0} unexpected bytes after the last snapshot entry")]
    TrailingBytes(usize),

    #[error("{0} does not fit a 32-bit length")]
    TooLarge(&'static str),
}

/// Decoded snapshot contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Wall-clock millis captured when the snapshot was taken
    pub reference_time: i64,
    pub records: Vec<(String, Record)>,
}

impl Snapshot {
    pub fn new(reference_time: i64, records: Vec<(String, Record)>) -> Self {
        Self {
            reference_time,
            records,
        }
    }

    /// Serialize into a blob. Fails if the record count, a key or a value
    /// exceeds `u32::MAX`.
    pub fn encode(&self) -> Result<Bytes, SnapshotError> {
        let body: usize = self
            .records
            .iter()
            .map(|(key, record)| 4 + key.len() + 4 + record.value().len() + 8)
            .sum();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + body);

        buf.put_slice(SNAPSHOT_MAGIC);
        buf.put_u8(SNAPSHOT_VERSION);
        buf.put_i64(self.reference_time);
        buf.put_u32(len_prefix(self.records.len(), "record count")?);

        for (key, record) in &self.records {
            put_str(&mut buf, key, "key")?;
            put_str(&mut buf, record.value(), "value")?;
            buf.put_i64(record.expires_at());
        }

        Ok(buf.freeze())
    }

    /// Parse a blob produced by [`Snapshot::encode`]
    pub fn decode(mut blob: &[u8]) -> Result<Self, SnapshotError> {
        if blob.remaining() < SNAPSHOT_MAGIC.len() {
            return Err(SnapshotError::Truncated("magic"));
        }
        let mut magic = [0u8; 4];
        blob.copy_to_slice(&mut magic);
        if &magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic);
        }

        if blob.remaining() < 1 {
            return Err(SnapshotError::Truncated("version"));
        }
        let version = blob.get_u8();
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }

        if blob.remaining() < 8 + 4 {
            return Err(SnapshotError::Truncated("header"));
        }
        let reference_time = blob.get_i64();
        let count = blob.get_u32() as usize;

        // Every entry takes at least 16 bytes, don't trust `count` beyond that
        let mut records = Vec::with_capacity(count.min(blob.remaining() / 16));
        for _ in 0..count {
            let key = get_str(&mut blob, "key")?;
            let value = get_str(&mut blob, "value")?;
            if blob.remaining() < 8 {
                return Err(SnapshotError::Truncated("expiration"));
            }
            let expires_at = blob.get_i64();
            records.push((key, Record::with_expiration(value, expires_at)));
        }

        if blob.has_remaining() {
            return Err(SnapshotError::TrailingBytes(blob.remaining()));
        }

        Ok(Self {
            reference_time,
            records,
        })
    }

    /// Move every expiration forward by `now - reference_time` and make
    /// `now` the new reference. Returns the applied delta.
    pub fn rebase(&mut self, now: i64) -> i64 {
        let delta = now.saturating_sub(self.reference_time);
        for (_, record) in &mut self.records {
            record.rebase(delta);
        }
        self.reference_time = now;
        delta
    }
}

fn len_prefix(len: usize, what: &'static str) -> Result<u32, SnapshotError> {
    u32::try_from(len).map_err(|_| SnapshotError::TooLarge(what))
}

fn put_str(buf: &mut BytesMut, s: &str, what: &'static str) -> Result<(), SnapshotError> {
    buf.put_u32(len_prefix(s.len(), what)?);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str(buf: &mut &[u8], what: &'static str) -> Result<String, SnapshotError> {
    if buf.remaining() < 4 {
        return Err(SnapshotError::Truncated(what));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(SnapshotError::Truncated(what));
    }
    let (text, rest) = buf.split_at(len);
    let text = std::str::from_utf8(text)
        .map_err(|_| SnapshotError::InvalidUtf8)?
        .to_owned();
    *buf = rest;
    Ok(text)
}
