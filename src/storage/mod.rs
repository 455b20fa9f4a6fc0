//! Storage Engine
//!
//! In-memory key-value store with per-record TTL, background eviction and
//! snapshot-based restore.

mod config;
mod evictor;
mod record;
mod shared;
mod store;

pub use config::{StoreConfig, DEFAULT_SWEEP_INTERVAL};
pub use record::{effective_ttl_ms, now_millis, Record, DEFAULT_TTL_MS, MAX_TTL_MS};
pub use shared::SharedStore;
pub use store::{PutOutcome, Store, EQUIVALENCE_TOLERANCE_MS};
