//! DB Module
//!
//! The façade applications talk to.
//!
//! ## Responsibilities
//! - Own one storage engine and one transaction manager
//! - Direct single-key operations, each under the engine-wide lock
//! - Hand out transactions under the configured protocol

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, Protocol};
use crate::error::Result;
use crate::storage::{self, LogStorage, SharedStorage};
use crate::txn::{decode_i32, encode_i32, LockManager, MvccManager, Transaction};

/// Transaction manager selected by [`Protocol`]
enum Manager {
    TwoPhaseLocking(Arc<LockManager>),
    Mvcc(Arc<MvccManager>),
}

/// An open database
///
/// Direct operations bypass the transaction managers: they are atomic on
/// their own but do not observe or respect transaction locks.
pub struct Db {
    storage: SharedStorage,
    manager: Manager,
    protocol: Protocol,
}

impl Db {
    /// Open or create a database with the given config
    pub fn open(config: Config) -> Result<Self> {
        let storage = storage::shared(LogStorage::open(&config)?);
        Ok(Self::with_storage(storage, config.protocol))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified log file
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }

    /// Build a database over any storage engine
    pub fn with_storage(storage: SharedStorage, protocol: Protocol) -> Self {
        let manager = match protocol {
            Protocol::TwoPhaseLocking => Manager::TwoPhaseLocking(Arc::new(LockManager::new())),
            Protocol::Mvcc => Manager::Mvcc(Arc::new(MvccManager::new(Arc::clone(&storage)))),
        };

        Self {
            storage,
            manager,
            protocol,
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.storage.lock().get(key)
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.storage.lock().put(key, value)
    }

    /// Add `delta` to the 4-byte big-endian counter at `key` (absent = 0)
    ///
    /// Read and write happen under one hold of the engine lock.
    pub fn increase32(&self, key: &[u8], delta: i32) -> Result<()> {
        let mut storage = self.storage.lock();
        let current = decode_i32(storage.get(key)?.as_deref())?;
        storage.put(key, &encode_i32(current.wrapping_add(delta)))
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.storage.lock().delete(key)
    }

    /// Begin a transaction under the configured protocol
    pub fn start_transaction(&self) -> Box<dyn Transaction> {
        match &self.manager {
            Manager::TwoPhaseLocking(manager) => Box::new(manager.begin(Arc::clone(&self.storage))),
            Manager::Mvcc(manager) => Box::new(manager.begin()),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The 2PL lock manager, when running under 2PL
    pub fn lock_manager(&self) -> Option<&Arc<LockManager>> {
        match &self.manager {
            Manager::TwoPhaseLocking(manager) => Some(manager),
            Manager::Mvcc(_) => None,
        }
    }

    /// The MVCC manager, when running under MVCC
    pub fn mvcc_manager(&self) -> Option<&Arc<MvccManager>> {
        match &self.manager {
            Manager::Mvcc(manager) => Some(manager),
            Manager::TwoPhaseLocking(_) => None,
        }
    }

    /// Close the database
    ///
    /// Syncs and releases the log. Transactions still alive afterwards fail
    /// when they touch storage.
    pub fn close(self) -> Result<()> {
        self.storage.lock().close()
    }
}
