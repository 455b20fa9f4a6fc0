//! Store Configuration

use std::time::Duration;

/// Period of the background eviction sweep
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Interval between eviction sweeps
    pub sweep_interval: Duration,

    /// DashMap shard count (None = DashMap default)
    pub shard_amount: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            shard_amount: None,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the eviction sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the shard count. DashMap requires a power of two greater than one;
    /// other values are rounded up to the next valid count.
    pub fn with_shard_amount(mut self, shards: usize) -> Self {
        self.shard_amount = Some(shards.max(2).next_power_of_two());
        self
    }
}
