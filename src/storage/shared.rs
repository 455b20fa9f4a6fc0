//! Live Store Handle
//!
//! Holds the store currently serving requests. A successful load swaps the
//! whole store at once: callers see either the old one or the new one.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use super::config::StoreConfig;
use super::record::Record;
use super::store::{PutOutcome, Store};
use crate::error::{Result, StoreError};

/// Swappable reference to the live [`Store`]
#[derive(Debug)]
pub struct SharedStore {
    current: RwLock<Store>,
    /// Serializes loads and shutdown so their stop/swap steps never
    /// interleave. Holds `true` once the store has been shut down.
    closed: Mutex<bool>,
}

impl SharedStore {
    pub fn new(store: Store) -> Self {
        Self {
            current: RwLock::new(store),
            closed: Mutex::new(false),
        }
    }

    /// Fresh store with the given configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn with_config(config: StoreConfig) -> Self {
        Self::new(Store::with_config(config))
    }

    /// Handle to the store live at the time of the call
    pub fn current(&self) -> Store {
        self.current.read().clone()
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.current().get(key)
    }

    pub fn put(&self, key: &str, value: &str, ttl_ms: Option<i64>) -> Result<PutOutcome> {
        self.current().put_ttl(key, value, ttl_ms)
    }

    pub fn remove(&self, key: &str) -> Option<Record> {
        self.current().remove(key)
    }

    pub fn is_valid(&self, key: &str) -> bool {
        self.current().is_valid(key)
    }

    pub fn dump_bytes(&self) -> Result<Bytes> {
        self.current().dump()
    }

    /// Replace the live store with one decoded from `blob`.
    ///
    /// The old store's evictor is stopped first. On failure it is restarted
    /// and the old store keeps serving. Fails with [`StoreError::Closed`]
    /// after [`SharedStore::shutdown`].
    pub fn load_bytes(&self, blob: &[u8]) -> Result<()> {
        let closed = self.closed.lock();
        if *closed {
            return Err(StoreError::Closed);
        }
        let old = self.current();
        old.stop_eviction();

        match Store::load_with_config(blob, old.config().clone()) {
            Ok(store) => {
                let records = store.len();
                *self.current.write() = store;
                info!(records = records, "Live store replaced from snapshot");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Snapshot load failed, keeping current store");
                old.start_eviction();
                Err(e)
            }
        }
    }

    /// Stop the live store's evictor and refuse further loads. Waits for a
    /// load in progress, then stops the store it installed. Idempotent.
    pub fn shutdown(&self) {
        let mut closed = self.closed.lock();
        self.current().stop_eviction();
        if !*closed {
            *closed = true;
            info!("Store shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}
