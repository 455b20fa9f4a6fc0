//! Error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::persistence::SnapshotError;

/// Errors reported synchronously by store operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Missing or empty key/value on put
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Snapshot blob could not be encoded or restored
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// The live store was shut down
    #[error("store is shut down")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised while starting the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to restore snapshot from {}: {source}", .path.display())]
    Restore {
        path: PathBuf,
        source: Box<ServerError>,
    },
}
