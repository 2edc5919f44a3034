//! Configuration for TideKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::log::MAX_FIELD_LEN;

/// Main configuration for a TideKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// The append-only log file. Created on open if missing.
    pub path: PathBuf,

    /// Sync strategy: how often to fsync the log
    pub sync_strategy: SyncStrategy,

    /// Largest key or value accepted by a write (in bytes). Capped at
    /// [`MAX_FIELD_LEN`], the most the record format can encode.
    pub max_entry_size: usize,

    // -------------------------------------------------------------------------
    // Transaction Configuration
    // -------------------------------------------------------------------------
    /// Concurrency control used by `Db::start_transaction`
    pub protocol: Protocol,
}

/// Log sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (durable before the call returns)
    EveryWrite,

    /// fsync after N appended records (trades durability for throughput)
    EveryNEntries { count: usize },
}

/// Transaction concurrency protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Strict two-phase locking with no-wait acquisition
    TwoPhaseLocking,

    /// Timestamp-ordered multi-version concurrency control
    Mvcc,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tidekv.log"),
            sync_strategy: SyncStrategy::EveryWrite,
            max_entry_size: MAX_FIELD_LEN,
            protocol: Protocol::TwoPhaseLocking,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the log sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the largest accepted key or value (in bytes)
    pub fn max_entry_size(mut self, size: usize) -> Self {
        self.config.max_entry_size = size;
        self
    }

    /// Set the transaction protocol
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
