//! Timestamp-ordered multi-version concurrency control
//!
//! Every transaction gets a unique timestamp from a logical clock at start.
//! Each key keeps an ordered chain of versions stamped with the timestamp of
//! the transaction that wrote it (`write_ts`) and the largest timestamp that
//! has read it (`read_ts`).
//!
//! Rules enforced here:
//! - a read at `ts` sees the newest version with `write_ts < ts`, and raises
//!   that version's `read_ts` to at least `ts`
//! - a write at `ts` needs the key's write lock, granted only if the latest
//!   version was neither written nor read at or after `ts`
//! - reads never fail and never wait; pending writes stay invisible until
//!   their transaction commits
//!
//! Lock order is always manager state, then storage. Storage is only touched
//! for in-memory index lookups while the state mutex is held.

use std::collections::hash_map::Entry as Slot;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, TideError};
use crate::log::Entry;
use crate::storage::SharedStorage;

use super::{decode_i32, encode_i32, ensure_running, Transaction, TxState};

/// One committed version of a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Largest timestamp that has read this version
    pub read_ts: u64,

    /// Timestamp of the transaction that created it (0 = loaded from storage)
    pub write_ts: u64,

    /// `None` for a delete
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct MvccState {
    /// Logical clock; the last timestamp handed out
    clock: u64,

    /// Versions per key, oldest first
    chains: HashMap<Vec<u8>, Vec<Version>>,

    /// Pending write locks: key → owner timestamp
    write_locks: HashMap<Vec<u8>, u64>,
}

/// Version chains, logical clock, and write locks shared by MVCC transactions
pub struct MvccManager {
    storage: SharedStorage,
    state: Mutex<MvccState>,
}

impl MvccManager {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            state: Mutex::new(MvccState::default()),
        }
    }

    /// Start a transaction with the next timestamp
    pub fn begin(self: &Arc<Self>) -> MvccTransaction {
        let ts = {
            let mut state = self.state.lock();
            state.clock += 1;
            state.clock
        };
        tracing::debug!("Begin MVCC transaction ts={}", ts);

        MvccTransaction {
            manager: Arc::clone(self),
            ts,
            view: BTreeMap::new(),
            locks: BTreeSet::new(),
            written: BTreeSet::new(),
            state: TxState::Running,
        }
    }

    /// Last timestamp handed out
    pub fn clock(&self) -> u64 {
        self.state.lock().clock
    }

    /// Versions held in memory for `key` (0 if never touched)
    pub fn version_count(&self, key: &[u8]) -> usize {
        self.state.lock().chains.get(key).map_or(0, Vec::len)
    }

    /// Newest version of `key`, if it has been touched
    pub fn latest_version(&self, key: &[u8]) -> Option<Version> {
        self.state
            .lock()
            .chains
            .get(key)
            .and_then(|chain| chain.last().cloned())
    }

    /// Timestamp holding the write lock on `key`
    pub fn lock_owner(&self, key: &[u8]) -> Option<u64> {
        self.state.lock().write_locks.get(key).copied()
    }

    /// Validate a write at `ts` and take the key's write lock
    pub fn lock(&self, key: &[u8], ts: u64) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.write_locks.get(key) {
            Some(&owner) if owner == ts => return Ok(()),
            Some(&owner) => {
                tracing::trace!("Write conflict on {:?}: ts={} owner={}", key, ts, owner);
                return Err(TideError::conflict(key, "write-locked by another transaction"));
            }
            None => {}
        }

        let chain = Self::chain(&mut state.chains, &self.storage, key)?;
        if let Some(latest) = chain.last() {
            if latest.write_ts >= ts {
                tracing::trace!("Write too late on {:?}: ts={} wts={}", key, ts, latest.write_ts);
                return Err(TideError::conflict(key, "a newer version exists"));
            }
            if latest.read_ts >= ts {
                tracing::trace!("Write too late on {:?}: ts={} rts={}", key, ts, latest.read_ts);
                return Err(TideError::conflict(key, "already read at or after this timestamp"));
            }
        }

        state.write_locks.insert(key.to_vec(), ts);
        Ok(())
    }

    /// Read the version of `key` visible at `ts`
    ///
    /// Only fails if loading the committed value from storage fails.
    pub fn read(&self, key: &[u8], ts: u64) -> Result<Option<Vec<u8>>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let chain = Self::chain(&mut state.chains, &self.storage, key)?;
        match chain.iter_mut().rev().find(|v| v.write_ts < ts) {
            Some(version) => {
                version.read_ts = version.read_ts.max(ts);
                Ok(version.value.clone())
            }
            None => Ok(None),
        }
    }

    /// Release write locks owned by `ts`
    pub fn unlock<'a>(&self, keys: impl IntoIterator<Item = &'a Vec<u8>>, ts: u64) {
        let mut state = self.state.lock();
        for key in keys {
            if state.write_locks.get(key) == Some(&ts) {
                state.write_locks.remove(key);
            }
        }
    }

    /// Publish committed writes as new versions and release their locks
    fn install(&self, entries: Vec<Entry>, ts: u64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for entry in entries {
            if state.write_locks.get(&entry.key) == Some(&ts) {
                state.write_locks.remove(&entry.key);
            }
            state.chains.entry(entry.key).or_default().push(Version {
                read_ts: ts,
                write_ts: ts,
                value: entry.value,
            });
        }
    }

    /// Chain for `key`, materializing the committed value on first touch
    fn chain<'a>(
        chains: &'a mut HashMap<Vec<u8>, Vec<Version>>,
        storage: &SharedStorage,
        key: &[u8],
    ) -> Result<&'a mut Vec<Version>> {
        match chains.entry(key.to_vec()) {
            Slot::Occupied(slot) => Ok(slot.into_mut()),
            Slot::Vacant(slot) => {
                let value = storage.lock().get(key)?;
                Ok(slot.insert(vec![Version {
                    read_ts: 0,
                    write_ts: 0,
                    value,
                }]))
            }
        }
    }
}

/// A transaction under timestamp-ordered MVCC
pub struct MvccTransaction {
    manager: Arc<MvccManager>,
    ts: u64,

    /// Values read or written so far; `None` = absent/deleted
    view: BTreeMap<Vec<u8>, Option<Vec<u8>>>,

    /// Keys write-locked by this transaction
    locks: BTreeSet<Vec<u8>>,

    /// Keys with buffered writes
    written: BTreeSet<Vec<u8>>,

    state: TxState,
}

impl MvccTransaction {
    pub fn timestamp(&self) -> u64 {
        self.ts
    }

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

    fn acquire(&mut self, key: &[u8]) -> Result<()> {
        if self.locks.contains(key) {
            return Ok(());
        }
        self.manager.lock(key, self.ts)?;
        self.locks.insert(key.to_vec());
        Ok(())
    }

    fn read_through(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.view.get(key) {
            return Ok(value.clone());
        }
        let value = self.manager.read(key, self.ts)?;
        self.view.insert(key.to_vec(), value.clone());
        Ok(value)
    }

    fn write(&mut self, key: &[u8], value: Option<Vec<u8>>) {
        self.view.insert(key.to_vec(), value);
        self.written.insert(key.to_vec());
    }

    fn release_all(&mut self) {
        self.manager.unlock(&self.locks, self.ts);
        self.locks.clear();
    }
}

impl Transaction for MvccTransaction {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.guarded(|tx| tx.read_through(key))
    }

    fn get_for_update(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.guarded(|tx| {
            tx.acquire(key)?;
            tx.read_through(key)
        })
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.guarded(|tx| {
            tx.acquire(key)?;
            tx.write(key, Some(value.to_vec()));
            Ok(())
        })
    }

    fn increase32(&mut self, key: &[u8], delta: i32) -> Result<()> {
        self.guarded(|tx| {
            tx.acquire(key)?;
            let current = decode_i32(tx.read_through(key)?.as_deref())?;
            tx.write(key, Some(encode_i32(current.wrapping_add(delta))));
            Ok(())
        })
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.guarded(|tx| {
            tx.acquire(key)?;
            tx.write(key, None);
            Ok(())
        })
    }

    fn commit(&mut self) -> Result<()> {
        self.guarded(|tx| {
            // Every written key is already write-locked
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
                tx.manager.storage.lock().put_batch(entries.clone())?;
            }

            tx.manager.install(entries, tx.ts);
            tx.release_all();
            tx.state = TxState::Committed;
            tracing::debug!("Committed MVCC transaction ts={}: {} keys written", tx.ts, count);
            Ok(())
        })
    }

    fn abort(&mut self) -> Result<()> {
        ensure_running(self.state)?;
        self.release_all();
        self.state = TxState::Aborted;
        tracing::debug!("Aborted MVCC transaction ts={}", self.ts);
        Ok(())
    }

    fn state(&self) -> TxState {
        self.state
    }
}

impl Drop for MvccTransaction {
    fn drop(&mut self) {
        if self.state == TxState::Running {
            self.release_all();
            self.state = TxState::Aborted;
        }
    }
}
