//! Background Evictor
//!
//! Periodic task that physically removes expired records from a store's map.
//! Reads already hide expired records; the evictor only reclaims memory.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::record::{now_millis, Record};

/// Map shared between a store and its evictor
pub(crate) type Entries = Arc<DashMap<String, Record>>;

/// Remove every record expired at `now`, returns count of removed keys
pub(crate) fn sweep(entries: &DashMap<String, Record>, now: i64) -> usize {
    let candidates = expired_keys(entries, now);
    evict(entries, candidates, now)
}

/// Keys whose records are expired at `now`
pub(crate) fn expired_keys(entries: &DashMap<String, Record>, now: i64) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| entry.value().is_expired_at(now))
        .map(|entry| entry.key().clone())
        .collect()
}

/// Remove `keys` whose records are still expired at `now`.
///
/// Each key is re-checked under its shard lock, so a key refreshed by a
/// concurrent put after [`expired_keys`] ran is kept.
pub(crate) fn evict(entries: &DashMap<String, Record>, keys: Vec<String>, now: i64) -> usize {
    evict_where(entries, keys, |record| record.is_expired_at(now))
}

/// Remove `keys` whose records match `expired`. A panic while removing one
/// key is logged and the remaining keys are still processed.
fn evict_where<F>(entries: &DashMap<String, Record>, keys: Vec<String>, expired: F) -> usize
where
    F: Fn(&Record) -> bool,
{
    let mut removed = 0;
    for key in keys {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            entries.remove_if(&key, |_, record| expired(record))
        }));
        match outcome {
            Ok(Some(_)) => removed += 1,
            Ok(None) => {}
            Err(_) => error!(key = %key, "Eviction of key panicked, skipping"),
        }
    }
    removed
}

/// Handle to a running eviction task
#[derive(Debug)]
pub struct Evictor {
    cancel: CancellationToken,
    /// `true` while ticks may run. A tick holds this lock for its whole sweep.
    active: Arc<Mutex<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Evictor {
    /// Spawn the eviction loop on the current Tokio runtime.
    ///
    /// The first sweep happens one `period` after the call. Periods below
    /// one millisecond are raised to one millisecond.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub(crate) fn spawn(entries: Entries, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let active = Arc::new(Mutex::new(true));
        let handle = tokio::spawn(Self::run(entries, period, cancel.clone(), active.clone()));

        Self {
            cancel,
            active,
            handle: Some(handle),
        }
    }

    async fn run(
        entries: Entries,
        period: Duration,
        cancel: CancellationToken,
        active: Arc<Mutex<bool>>,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Evictor started, interval: {:?}", period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !Self::tick(&entries, &active) {
                        break;
                    }
                }
            }
        }

        debug!("Evictor loop exited");
    }

    /// One sweep under the activity lock, returns false once stopped
    fn tick(entries: &DashMap<String, Record>, active: &Mutex<bool>) -> bool {
        let active = active.lock();
        if !*active {
            return false;
        }

        let removed = sweep(entries, now_millis());
        if removed > 0 {
            debug!(removed = removed, remaining = entries.len(), "Evicted expired keys");
        }
        true
    }

    /// Whether the evictor has not been stopped
    pub fn is_running(&self) -> bool {
        *self.active.lock()
    }

    /// Stop the evictor. Idempotent.
    ///
    /// Once this returns no sweep is in progress and none will start: the
    /// activity lock is only acquired after any running sweep has released it.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        {
            let mut active = self.active.lock();
            if !*active {
                return;
            }
            *active = false;
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        info!("Evictor stopped");
    }
}

impl Drop for Evictor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries_with(records: &[(&str, i64)]) -> Entries {
        let entries = Arc::new(DashMap::new());
        for (key, expires_at) in records {
            entries.insert(key.to_string(), Record::with_expiration("v", *expires_at));
        }
        entries
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let entries = entries_with(&[("old", 100), ("edge", 500), ("fresh", 900)]);

        let removed = sweep(&entries, 500);
        assert_eq!(removed, 2);
        assert!(entries.contains_key("fresh"));
        assert!(!entries.contains_key("edge"));
        assert!(!entries.contains_key("old"));
    }

    #[test]
    fn test_refreshed_key_survives_removal_phase() {
        let entries = entries_with(&[("stale", 100), ("refreshed", 200)]);

        let mut candidates = expired_keys(&entries, 500);
        candidates.sort();
        assert_eq!(candidates, vec!["refreshed".to_string(), "stale".to_string()]);

        // Put between the scan and the removal
        entries.insert("refreshed".to_string(), Record::with_expiration("new", 10_000));

        assert_eq!(evict(&entries, candidates, 500), 1);
        assert!(!entries.contains_key("stale"));
        assert_eq!(entries.get("refreshed").unwrap().value().value(), "new");
    }

    #[test]
    fn test_panicking_key_does_not_halt_removal() {
        let entries = entries_with(&[("a", 0), ("c", 0)]);
        entries.insert("bad".to_string(), Record::with_expiration("corrupt", 0));
        let keys = vec!["a".to_string(), "bad".to_string(), "c".to_string()];

        let removed = evict_where(&entries, keys, |record| {
            if record.value() == "corrupt" {
                panic!("unreadable record");
            }
            true
        });

        assert_eq!(removed, 2);
        assert!(entries.contains_key("bad"));
        assert!(!entries.contains_key("a"));
        assert!(!entries.contains_key("c"));
        // Shard lock was released by the unwind
        assert!(entries.remove("bad").is_some());
    }

    #[test]
    fn test_sweep_on_empty_map() {
        let entries = entries_with(&[]);
        assert_eq!(sweep(&entries, now_millis()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_evictor_removes_in_background() {
        let entries = entries_with(&[("a", 0), ("b", 0), ("keep", i64::MAX)]);
        let mut evictor = Evictor::spawn(entries.clone(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("keep"));

        evictor.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_is_idempotent_and_final() {
        let entries = entries_with(&[]);
        let mut evictor = Evictor::spawn(entries.clone(), Duration::from_millis(20));
        assert!(evictor.is_running());

        evictor.stop();
        evictor.stop();
        assert!(!evictor.is_running());

        entries.insert("late".to_string(), Record::with_expiration("v", 0));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(entries.contains_key("late"));
    }
}
