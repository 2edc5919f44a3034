//! Strict two-phase locking
//!
//! No-wait lock table plus the transaction that uses it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, TideError};
use crate::log::Entry;
use crate::storage::SharedStorage;

use super::{decode_i32, encode_i32, ensure_running, Transaction, TxState};

/// Lock mode requested or held on a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Current lock on a key
///
/// An entry exists only while `holders > 0`, and an exclusive lock always
/// has exactly one holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockState {
    pub mode: LockMode,
    pub holders: usize,
}

/// Per-key shared/exclusive lock table
///
/// One mutex guards the whole table. Acquisition never waits: a conflicting
/// request fails at once and the caller must abort.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<Vec<u8>, LockState>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `mode` on `key`.
    ///
    /// Succeeds when the key is unlocked, or when both the request and the
    /// current lock are shared. Everything else is a conflict.
    pub fn lock(&self, key: &[u8], mode: LockMode) -> Result<()> {
        let mut locks = self.locks.lock();

        match locks.get_mut(key) {
            None => {
                locks.insert(key.to_vec(), LockState { mode, holders: 1 });
                Ok(())
            }
            Some(state) if mode == LockMode::Shared && state.mode == LockMode::Shared => {
                state.holders += 1;
                Ok(())
            }
            Some(state) => {
                tracing::trace!("Lock conflict on {:?}: want {:?}, held {:?}", key, mode, state);
                Err(TideError::conflict(key, "key is locked by another transaction"))
            }
        }
    }

    /// Release one hold on `key`
    pub fn unlock(&self, key: &[u8]) {
        let mut locks = self.locks.lock();

        if let Some(state) = locks.get_mut(key) {
            state.holders -= 1;
            if state.holders == 0 {
                locks.remove(key);
            }
        }
    }

    /// Turn a shared lock into an exclusive one in place.
    ///
    /// Only the sole holder of a shared lock can upgrade.
    pub fn upgrade(&self, key: &[u8]) -> Result<()> {
        let mut locks = self.locks.lock();

        match locks.get_mut(key) {
            Some(state) if state.mode == LockMode::Shared && state.holders == 1 => {
                state.mode = LockMode::Exclusive;
                Ok(())
            }
            state => {
                tracing::trace!("Upgrade conflict on {:?}: {:?}", key, state);
                Err(TideError::conflict(key, "shared lock has other holders"))
            }
        }
    }

    /// Current lock on `key`, if any
    pub fn lock_state(&self, key: &[u8]) -> Option<LockState> {
        self.locks.lock().get(key).copied()
    }

    /// Number of locked keys
    pub fn locked_keys(&self) -> usize {
        self.locks.lock().len()
    }

    /// Start a transaction reading from and committing to `storage`
    pub fn begin(self: &Arc<Self>, storage: SharedStorage) -> TwoPlTransaction {
        tracing::debug!("Begin 2PL transaction");
        TwoPlTransaction {
            manager: Arc::clone(self),
            storage,
            view: BTreeMap::new(),
            written: BTreeSet::new(),
            locks: HashMap::new(),
            state: TxState::Running,
        }
    }
}

/// A transaction under strict two-phase locking
///
/// Reads take shared locks, writes take exclusive ones (upgrading a shared
/// lock already held). Locks accumulate until commit or abort releases them
/// all at once.
pub struct TwoPlTransaction {
    manager: Arc<LockManager>,
    storage: SharedStorage,

    /// Values read or written so far; `None` = absent/deleted
    view: BTreeMap<Vec<u8>, Option<Vec<u8>>>,

    /// Keys with buffered writes
    written: BTreeSet<Vec<u8>>,

    /// Locks this transaction holds
    locks: HashMap<Vec<u8>, LockMode>,

    state: TxState,
}

impl TwoPlTransaction {
    /// Run `op` on a running transaction, aborting if it fails
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        ensure_running(self.state)?;
        let result = op(self);
        if result.is_err() {
            self.release_all();
            self.state = TxState::Aborted;
        }
        result
    }

    fn acquire_shared(&mut self, key: &[u8]) -> Result<()> {
        if self.locks.contains_key(key) {
            return Ok(());
        }
        self.manager.lock(key, LockMode::Shared)?;
        self.locks.insert(key.to_vec(), LockMode::Shared);
        Ok(())
    }

    fn acquire_exclusive(&mut self, key: &[u8]) -> Result<()> {
        match self.locks.get(key) {
            Some(LockMode::Exclusive) => return Ok(()),
            Some(LockMode::Shared) => self.manager.upgrade(key)?,
            None => self.manager.lock(key, LockMode::Exclusive)?,
        }
        self.locks.insert(key.to_vec(), LockMode::Exclusive);
        Ok(())
    }

    /// Value from the view, else from committed storage (then cached)
    fn read_through(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.view.get(key) {
            return Ok(value.clone());
        }
        let value = self.storage.lock().get(key)?;
        self.view.insert(key.to_vec(), value.clone());
        Ok(value)
    }

    fn write(&mut self, key: &[u8], value: Option<Vec<u8>>) {
        self.view.insert(key.to_vec(), value);
        self.written.insert(key.to_vec());
    }

    fn release_all(&mut self) {
        for key in self.locks.keys() {
            self.manager.unlock(key);
        }
        self.locks.clear();
    }

    /// Keys this transaction currently holds a lock on
    pub fn held_locks(&self) -> usize {
        self.locks.len()
    }
}

impl Transaction for TwoPlTransaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.guarded(|tx| {
            tx.acquire_shared(key)?;
            tx.read_through(key)
        })
    }

    fn get_for_update(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.guarded(|tx| {
            tx.acquire_exclusive(key)?;
            tx.read_through(key)
        })
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.guarded(|tx| {
            tx.acquire_exclusive(key)?;
            tx.write(key, Some(value.to_vec()));
            Ok(())
        })
    }

    fn increase32(&mut self, key: &[u8], delta: i32) -> Result<()> {
        self.guarded(|tx| {
            tx.acquire_exclusive(key)?;
            let current = decode_i32(tx.read_through(key)?.as_deref())?;
            tx.write(key, Some(encode_i32(current.wrapping_add(delta))));
            Ok(())
        })
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.guarded(|tx| {
            tx.acquire_exclusive(key)?;
            tx.write(key, None);
            Ok(())
        })
    }

    fn commit(&mut self) -> Result<()> {
        self.guarded(|tx| {
            let entries: Vec<Entry> = tx
                .written
                .iter()
                .map(|key| Entry {
                    key: key.clone(),
                    value: tx.view.get(key).cloned().flatten(),
                })
                .collect();

            let count = entries.len();
            if !entries.is_empty() {
                tx.storage.lock().put_batch(entries)?;
            }

            tx.release_all();
            tx.state = TxState::Committed;
            tracing::debug!("Committed 2PL transaction: {} keys written", count);
            Ok(())
        })
    }

    fn abort(&mut self) -> Result<()> {
        ensure_running(self.state)?;
        self.release_all();
        self.state = TxState::Aborted;
        tracing::debug!("Aborted 2PL transaction");
        Ok(())
    }

    fn state(&self) -> TxState {
        self.state
    }
}

impl Drop for TwoPlTransaction {
    fn drop(&mut self) {
        if self.state == TxState::Running {
            self.release_all();
            self.state = TxState::Aborted;
        }
    }
}
