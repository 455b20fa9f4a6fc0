//! Server Configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::DEFAULT_MAX_PAYLOAD;
use crate::storage::{StoreConfig, DEFAULT_SWEEP_INTERVAL};

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address
    pub bind: String,

    /// Port number
    pub port: u16,

    /// Eviction sweep interval
    pub sweep_interval: Duration,

    /// Store shard count (None = derived from CPU count)
    pub shards: Option<usize>,

    /// Largest accepted frame payload in bytes
    pub max_payload: usize,

    /// Snapshot file restored before accepting connections
    pub restore_from: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8082,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            shards: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
            restore_from: None,
        }
    }
}

impl Config {
    /// Create a new config with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Create a new config with custom bind address
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Set eviction sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn with_max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes;
        self
    }

    /// Restore the store from a snapshot file at start-up
    pub fn with_restore_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.restore_from = Some(path.into());
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Store configuration derived from this server configuration
    pub fn store_config(&self) -> StoreConfig {
        // 4 shards per core for reduced contention
        let shards = self.shards.unwrap_or_else(|| num_cpus::get() * 4);
        StoreConfig::new()
            .with_sweep_interval(self.sweep_interval)
            .with_shard_amount(shards)
    }
}
