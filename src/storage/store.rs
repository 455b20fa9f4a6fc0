//! TTL Key-Value Store
//!
//! DashMap of records with lazy expiration on read and an owned background
//! evictor. Per-key operations take only the owning shard's lock.

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::config::StoreConfig;
use super::evictor::{self, Entries, Evictor};
use super::record::{effective_ttl_ms, now_millis, Record};
use crate::error::{Result, StoreError};
use crate::persistence::Snapshot;

/// Max difference in remaining TTL for two stores to still be equivalent
pub const EQUIVALENCE_TOLERANCE_MS: i64 = 250;

/// Result of a successful put
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No valid record existed under the key
    Created,
    /// A valid record was replaced
    Updated,
}

#[derive(Debug)]
struct StoreInner {
    entries: Entries,
    config: StoreConfig,
    /// Dropping the evictor stops it
    evictor: Mutex<Option<Evictor>>,
}

/// Concurrent key-value store with per-record TTL
///
/// Cloning is cheap and yields another handle to the same map. The evictor
/// is stopped when the last handle is dropped, or earlier through
/// [`Store::stop_eviction`].
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Create an empty store with default configuration and start its evictor
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store and start its evictor
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn with_config(config: StoreConfig) -> Self {
        let entries = match config.shard_amount {
            Some(shards) => DashMap::with_shard_amount(shards),
            None => DashMap::new(),
        };
        Self::from_entries(Arc::new(entries), config)
    }

    fn from_entries(entries: Entries, config: StoreConfig) -> Self {
        let store = Self {
            inner: Arc::new(StoreInner {
                entries,
                config,
                evictor: Mutex::new(None),
            }),
        };
        store.start_eviction();
        store
    }

    /// Put with the default TTL
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<PutOutcome> {
        self.put_ttl(key, value, None)
    }

    /// Put with a TTL in milliseconds.
    ///
    /// A missing TTL, or one above the maximum, is replaced by the default.
    /// Zero or negative TTLs are stored as given and produce a record that is
    /// already expired.
    pub fn put_ttl(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl_ms: Option<i64>,
    ) -> Result<PutOutcome> {
        let key = key.into();
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("key is empty".to_string()));
        }

        let now = now_millis();
        let record = Record::new(value, effective_ttl_ms(ttl_ms), now);
        let previous = self.inner.entries.insert(key, record);

        Ok(match previous {
            Some(old) if old.is_valid_at(now) => PutOutcome::Updated,
            _ => PutOutcome::Created,
        })
    }

    /// Put with a TTL in seconds, converted to milliseconds before the
    /// usual TTL policy applies
    pub fn put_ttl_seconds(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl_secs: Option<i64>,
    ) -> Result<PutOutcome> {
        self.put_ttl(key, value, ttl_secs.map(|secs| secs.saturating_mul(1000)))
    }

    /// Get a record if it is present and not expired
    pub fn get(&self, key: &str) -> Option<Record> {
        let now = now_millis();
        self.inner
            .entries
            .get(key)
            .filter(|entry| entry.value().is_valid_at(now))
            .map(|entry| entry.value().clone())
    }

    /// Remove a key regardless of expiration, returning what was stored
    pub fn remove(&self, key: &str) -> Option<Record> {
        self.inner.entries.remove(key).map(|(_, record)| record)
    }

    /// True if the key is present and not expired
    pub fn is_valid(&self, key: &str) -> bool {
        let now = now_millis();
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.value().is_valid_at(now))
            .unwrap_or(false)
    }

    /// True if the key is physically present, expired or not
    pub fn exists(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    /// Number of physically present records (including expired)
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Run one eviction sweep now, returns count of removed keys
    pub fn evict_expired(&self) -> usize {
        evictor::sweep(&self.inner.entries, now_millis())
    }

    /// Start the background evictor if it is not running
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn start_eviction(&self) {
        let mut slot = self.inner.evictor.lock();
        if slot.as_ref().map(Evictor::is_running).unwrap_or(false) {
            return;
        }
        *slot = Some(Evictor::spawn(
            self.inner.entries.clone(),
            self.inner.config.sweep_interval,
        ));
    }

    /// Stop the background evictor. Idempotent; no sweep runs after this returns.
    pub fn stop_eviction(&self) {
        if let Some(mut evictor) = self.inner.evictor.lock().take() {
            evictor.stop();
        }
    }

    pub fn is_evicting(&self) -> bool {
        self.inner
            .evictor
            .lock()
            .as_ref()
            .map(Evictor::is_running)
            .unwrap_or(false)
    }

    /// Snapshot of every record, taken shard by shard
    pub fn snapshot(&self) -> Snapshot {
        let reference_time = now_millis();
        let records = self
            .inner
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        Snapshot::new(reference_time, records)
    }

    /// Encode the whole store into an opaque blob
    pub fn dump(&self) -> Result<Bytes> {
        let snapshot = self.snapshot();
        debug!(records = snapshot.records.len(), "Dumping store");
        Ok(snapshot.encode()?)
    }

    /// Rebuild a store from a blob, with default configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn load(blob: &[u8]) -> Result<Self> {
        Self::load_with_config(blob, StoreConfig::default())
    }

    /// Rebuild a store from a blob produced by [`Store::dump`].
    ///
    /// Expirations are shifted by the time elapsed since the dump, so each
    /// record keeps the remaining TTL it had then. The new store gets its
    /// own running evictor.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn load_with_config(blob: &[u8], config: StoreConfig) -> Result<Self> {
        let mut snapshot = Snapshot::decode(blob)?;
        let delta = snapshot.rebase(now_millis());

        let entries = match config.shard_amount {
            Some(shards) => DashMap::with_capacity_and_shard_amount(snapshot.records.len(), shards),
            None => DashMap::with_capacity(snapshot.records.len()),
        };
        for (key, record) in snapshot.records {
            entries.insert(key, record);
        }
        info!(records = entries.len(), delta_ms = delta, "Store loaded from snapshot");

        Ok(Self::from_entries(Arc::new(entries), config))
    }

    /// Same keys, same values, and remaining TTLs within
    /// [`EQUIVALENCE_TOLERANCE_MS`] of each other
    pub fn is_equivalent(&self, other: &Store) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        if self.len() != other.len() {
            return false;
        }

        let now = now_millis();
        self.inner.entries.iter().all(|entry| {
            let record = entry.value();
            other.inner.entries.get(entry.key()).is_some_and(|theirs| {
                record.value() == theirs.value().value()
                    && (record.ttl_ms(now) - theirs.ttl_ms(now)).abs() <= EQUIVALENCE_TOLERANCE_MS
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::{DEFAULT_TTL_MS, MAX_TTL_MS};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Tolerance for TTL read back immediately after a put
    const STORE_DELAY_MS: i64 = 10;

    fn fast_store() -> Store {
        Store::with_config(StoreConfig::new().with_sweep_interval(Duration::from_millis(100)))
    }

    #[tokio::test]
    async fn test_put_and_get_default_ttl() {
        let store = Store::new();
        assert_eq!(store.put("myKey", "myValue"), Ok(PutOutcome::Created));

        let record = store.get("myKey").unwrap();
        assert_eq!(record.value(), "myValue");
        assert!((record.ttl_ms(now_millis()) - DEFAULT_TTL_MS).abs() <= STORE_DELAY_MS);
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_put_existing_updates_value_and_ttl() {
        let store = Store::new();
        store.put_ttl("myKey", "myValue", None).unwrap();
        assert_eq!(
            store.put_ttl("myKey", "myValue2", Some(700)),
            Ok(PutOutcome::Updated)
        );

        let record = store.get("myKey").unwrap();
        assert_eq!(record.value(), "myValue2");
        assert!((record.ttl_ms(now_millis()) - 700).abs() <= STORE_DELAY_MS);
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = Store::new();
        assert_eq!(store.get("nonExistentKey"), None);
        store.put("myKey", "myValue").unwrap();
        assert_eq!(store.get("myKey2"), None);
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let store = Store::new();
        assert!(matches!(
            store.put("", "value"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_ttl_bounds() {
        let store = Store::new();
        let now = now_millis();

        store.put_ttl("over", "v", Some(MAX_TTL_MS + 1)).unwrap();
        let ttl = store.get("over").unwrap().ttl_ms(now);
        assert!((ttl - DEFAULT_TTL_MS).abs() <= STORE_DELAY_MS);

        store.put_ttl("max", "v", Some(MAX_TTL_MS)).unwrap();
        assert!(store.get("max").unwrap().ttl_ms(now) >= MAX_TTL_MS - STORE_DELAY_MS);

        // Non-positive TTL yields an expired but physically present record
        store.put_ttl("zero", "v", Some(0)).unwrap();
        store.put_ttl("negative", "v", Some(-1_000)).unwrap();
        assert_eq!(store.get("zero"), None);
        assert_eq!(store.get("negative"), None);
        assert!(store.exists("zero"));
        assert!(!store.is_valid("negative"));
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_put_ttl_seconds() {
        let store = Store::new();
        store.put_ttl_seconds("k", "v", Some(5)).unwrap();
        let ttl = store.get("k").unwrap().ttl_ms(now_millis());
        assert!((ttl - 5_000).abs() <= STORE_DELAY_MS);

        store.put_ttl_seconds("huge", "v", Some(i64::MAX)).unwrap();
        let ttl = store.get("huge").unwrap().ttl_ms(now_millis());
        assert!((ttl - DEFAULT_TTL_MS).abs() <= STORE_DELAY_MS);
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_expired_value_is_not_returned() {
        let store = Store::new();
        store.stop_eviction();
        store.put_ttl("k", "v", Some(1)).unwrap();

        sleep(Duration::from_millis(1250)).await;
        assert_eq!(store.get("k"), None);
        assert!(!store.is_valid("k"));
        // Lazy expiration leaves the record in place
        assert!(store.exists("k"));
    }

    #[tokio::test]
    async fn test_put_over_expired_record_is_created() {
        let store = Store::new();
        store.put_ttl("k", "old", Some(-1)).unwrap();
        assert_eq!(store.put("k", "new"), Ok(PutOutcome::Created));
        assert_eq!(store.put("k", "newer"), Ok(PutOutcome::Updated));
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_remove() {
        let store = Store::new();
        store.put_ttl("myKey", "myValue", None).unwrap();
        assert_eq!(store.remove("myKey").unwrap().value(), "myValue");
        assert_eq!(store.get("myKey"), None);

        assert_eq!(store.remove("myKey"), None);

        // Removal ignores expiration
        store.put_ttl("expired", "gone", Some(-1)).unwrap();
        assert_eq!(store.remove("expired").unwrap().value(), "gone");
        assert!(!store.exists("expired"));
        store.stop_eviction();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_evictor_removes_expired_records() {
        let store = fast_store();
        store.put_ttl("myKey", "myValue", Some(1)).unwrap();
        store.put_ttl("myKey2", "myValue2", Some(1)).unwrap();
        store.put("alive", "v").unwrap();

        sleep(Duration::from_millis(300)).await;
        assert_eq!(store.len(), 1);
        assert!(store.exists("alive"));
        store.stop_eviction();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_evictor_default_period() {
        let store = Store::new();
        store.put_ttl("k", "v", Some(1000)).unwrap();

        sleep(store.config().sweep_interval + Duration::from_millis(1250)).await;
        assert!(!store.exists("k"));
        store.stop_eviction();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stopped_evictor_leaves_records() {
        let store = fast_store();
        store.stop_eviction();
        assert!(!store.is_evicting());

        store.put_ttl("myKey", "myValue", Some(1)).unwrap();
        store.put_ttl("myKey2", "myValue2", Some(1)).unwrap();

        sleep(Duration::from_millis(300)).await;
        assert_eq!(store.len(), 2);

        // Restarting resumes cleanup
        store.start_eviction();
        assert!(store.is_evicting());
        sleep(Duration::from_millis(300)).await;
        assert!(store.is_empty());
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_manual_eviction() {
        let store = Store::new();
        store.stop_eviction();
        for i in 0..10 {
            store.put_ttl(format!("key{}", i), "v", Some(0)).unwrap();
        }
        store.put("keep", "v").unwrap();

        assert_eq!(store.evict_expired(), 10);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts() {
        let store = Store::new();

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let s = store.clone();
                tokio::spawn(async move {
                    for j in 0..100 {
                        let key = format!("key-{}-{}", i, j);
                        s.put(key.clone(), format!("value-{}-{}", i, j)).unwrap();
                        assert!(s.is_valid(&key));
                    }
                })
            })
            .collect();

        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.len(), 1000);
        assert_eq!(store.get("key-3-7").unwrap().value(), "value-3-7");
        store.stop_eviction();
    }

    #[tokio::test]
    async fn test_equivalence() {
        let first = Store::new();
        first.put_ttl("myKey", "myValue", Some(1_000)).unwrap();
        first.put_ttl("myKey2", "myValue2", Some(1_000)).unwrap();

        let second = Store::new();
        second.put_ttl("myKey", "myValue", Some(1_000)).unwrap();
        second.put_ttl("myKey2", "myValue2", Some(1_000)).unwrap();
        assert!(first.is_equivalent(&second));

        second.put_ttl("myKey2", "myValue2", Some(5_000)).unwrap();
        assert!(!first.is_equivalent(&second));

        let third = Store::new();
        third.put_ttl("myKey", "myValue", Some(1_000)).unwrap();
        third.put_ttl("myKey_OTHER", "myValue_OTHER", Some(1_000)).unwrap();
        assert!(!first.is_equivalent(&third));

        let subset = Store::new();
        subset.put_ttl("myKey", "myValue", Some(1_000)).unwrap();
        assert!(!first.is_equivalent(&subset));
        assert!(!subset.is_equivalent(&first));

        for store in [first, second, third, subset] {
            store.stop_eviction();
        }
    }

    #[tokio::test]
    async fn test_dump_load_round_trip() {
        let store = Store::new();
        store.put_ttl("myKey", "myValue", Some(5_000)).unwrap();
        store.put_ttl("myKey2", "myValue2", Some(10_000)).unwrap();
        store.put_ttl("myKey3", "", None).unwrap();
        store.stop_eviction();

        let loaded = Store::load(&store.dump().unwrap()).unwrap();
        assert!(loaded.is_evicting());
        assert!(store.is_equivalent(&loaded));
        assert_eq!(loaded.get("myKey2").unwrap().value(), "myValue2");
        loaded.stop_eviction();
    }

    #[tokio::test]
    async fn test_load_preserves_remaining_ttl() {
        let store = Store::new();
        store.stop_eviction();
        store.put_ttl("k", "v", Some(5_000)).unwrap();

        let blob = store.dump().unwrap();
        sleep(Duration::from_millis(1_000)).await;
        let loaded = Store::load(&blob).unwrap();

        // Time between dump and load does not count against the record
        let ttl = loaded.get("k").unwrap().ttl_ms(now_millis());
        assert!((ttl - 5_000).abs() <= EQUIVALENCE_TOLERANCE_MS, "ttl = {}", ttl);
        loaded.stop_eviction();
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        assert!(matches!(
            Store::load(b"definitely not a snapshot"),
            Err(StoreError::Snapshot(_))
        ));
    }
}
