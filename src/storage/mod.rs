//! Storage Module
//!
//! Durable key-value storage behind the [`Storage`] trait.
//!
//! ## Responsibilities
//! - Point lookups served from the in-memory index (no disk I/O)
//! - Single puts/deletes and all-or-nothing batches, one log record each
//! - Crash recovery by full replay on open
//!
//! ## Concurrency
//! An engine is not safe for composite read-modify-write sequences on its
//! own. It is shared as a [`SharedStorage`] (`Arc<Mutex<dyn Storage>>`), and
//! holding the mutex guard is the engine-wide lock: callers keep it across a
//! whole `get` + `put` sequence. Each individual `put`/`put_batch` keeps the
//! log and the index consistent with each other.

mod log_storage;
mod memory;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::log::Entry;

pub use log_storage::LogStorage;
pub use memory::MemoryStorage;

/// Capability set of a storage engine
pub trait Storage: Send {
    /// Current value for `key`, or `None` if absent
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Durably store `value` under `key`
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Durably apply every entry as one unit (`None` values delete)
    fn put_batch(&mut self, entries: Vec<Entry>) -> Result<()>;

    /// Durably remove `key`
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Release the underlying resources. Later calls fail with
    /// [`StorageClosed`](crate::TideError::StorageClosed).
    fn close(&mut self) -> Result<()>;
}

/// A storage engine shared between the façade and transactions
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Wrap a storage engine for sharing
pub fn shared<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}
