//! Persistence Module
//!
//! Snapshot encoding used by dump/load.

mod snapshot;

pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
