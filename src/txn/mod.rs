//! Transaction Module
//!
//! Multi-key transactions over a [`SharedStorage`](crate::storage::SharedStorage)
//! under one of two concurrency-control protocols.
//!
//! ## Protocols
//! - **2PL** ([`LockManager`] / [`TwoPlTransaction`]): strict two-phase
//!   locking with shared/exclusive locks per key. All locks are held until
//!   commit or abort.
//! - **MVCC** ([`MvccManager`] / [`MvccTransaction`]): timestamp ordering over
//!   per-key version chains and a logical clock.
//!
//! Both managers acquire without waiting. A conflict fails the operation
//! immediately, aborts the transaction (releasing everything it held), and
//! surfaces as [`TideError::LockConflict`](crate::TideError::LockConflict).
//! Nothing ever blocks on another transaction, so deadlock is impossible.
//!
//! Writes are buffered in a private write-view and reach storage only on
//! commit, as a single batch record.

mod counter;
mod mvcc;
mod twopl;

use crate::error::{Result, TideError};

pub use counter::{decode_i32, encode_i32};
pub use mvcc::{MvccManager, MvccTransaction, Version};
pub use twopl::{LockManager, LockMode, LockState, TwoPlTransaction};

/// Lifecycle of a transaction. `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Running,
    Committed,
    Aborted,
}

/// Operations shared by both transaction kinds
///
/// Every method fails with `InactiveTransaction` once the transaction has
/// committed or aborted. Any other failure aborts the transaction before it
/// is returned, so callers never need to clean up.
pub trait Transaction: Send {
    /// Read `key`, seeing this transaction's own buffered writes
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Read `key` with intent to write it
    fn get_for_update(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Buffer a write
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Add `delta` to the 4-byte big-endian counter at `key` (absent = 0)
    fn increase32(&mut self, key: &[u8], delta: i32) -> Result<()>;

    /// Buffer a delete
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Write every buffered change as one batch, then release all locks
    fn commit(&mut self) -> Result<()>;

    /// Discard buffered changes and release all locks
    fn abort(&mut self) -> Result<()>;

    fn state(&self) -> TxState;
}

pub(crate) fn ensure_running(state: TxState) -> Result<()> {
    if state != TxState::Running {
        return Err(TideError::InactiveTransaction);
    }
    Ok(())
}
