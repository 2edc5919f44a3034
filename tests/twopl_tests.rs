//! Tests for strict two-phase locking
//!
//! These tests verify:
//! - Lock table: shared coexistence, exclusive exclusivity, upgrade rules
//! - Read-your-writes and write buffering
//! - No-wait conflicts abort immediately and release locks
//! - Commit writes one batch; abort writes nothing
//! - Inactive transactions reject every operation
//! - Concurrent increments under retry

use std::sync::Arc;

use tidekv::storage::{self, SharedStorage};
use tidekv::txn::{encode_i32, LockManager, LockMode, LockState, TwoPlTransaction};
use tidekv::{MemoryStorage, TideError, Transaction, TxState};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (Arc<LockManager>, SharedStorage) {
    (Arc::new(LockManager::new()), storage::shared(MemoryStorage::new()))
}

fn begin(manager: &Arc<LockManager>, storage: &SharedStorage) -> TwoPlTransaction {
    manager.begin(Arc::clone(storage))
}

fn assert_conflict<T: std::fmt::Debug>(result: tidekv::Result<T>) {
    match result {
        Err(TideError::LockConflict { .. }) => {}
        other => panic!("expected lock conflict, got {:?}", other),
    }
}

fn assert_inactive<T: std::fmt::Debug>(result: tidekv::Result<T>) {
    match result {
        Err(TideError::InactiveTransaction) => {}
        other => panic!("expected inactive transaction, got {:?}", other),
    }
}

// =============================================================================
// Lock Manager Tests
// =============================================================================

#[test]
fn test_shared_locks_coexist() {
    let manager = LockManager::new();

    manager.lock(b"k", LockMode::Shared).unwrap();
    manager.lock(b"k", LockMode::Shared).unwrap();
    manager.lock(b"k", LockMode::Shared).unwrap();

    assert_eq!(
        manager.lock_state(b"k"),
        Some(LockState {
            mode: LockMode::Shared,
            holders: 3
        })
    );
}

#[test]
fn test_exclusive_excludes_everything() {
    let manager = LockManager::new();

    manager.lock(b"k", LockMode::Exclusive).unwrap();
    assert_conflict(manager.lock(b"k", LockMode::Exclusive));
    assert_conflict(manager.lock(b"k", LockMode::Shared));

    assert_eq!(
        manager.lock_state(b"k"),
        Some(LockState {
            mode: LockMode::Exclusive,
            holders: 1
        })
    );
}

#[test]
fn test_shared_blocks_exclusive() {
    let manager = LockManager::new();

    manager.lock(b"k", LockMode::Shared).unwrap();
    assert_conflict(manager.lock(b"k", LockMode::Exclusive));
}

#[test]
fn test_unlock_removes_entry_at_zero() {
    let manager = LockManager::new();

    manager.lock(b"k", LockMode::Shared).unwrap();
    manager.lock(b"k", LockMode::Shared).unwrap();

    manager.unlock(b"k");
    assert_eq!(manager.lock_state(b"k").unwrap().holders, 1);

    manager.unlock(b"k");
    assert_eq!(manager.lock_state(b"k"), None);
    assert_eq!(manager.locked_keys(), 0);

    // Now free for exclusive
    manager.lock(b"k", LockMode::Exclusive).unwrap();
}

#[test]
fn test_upgrade_sole_shared_holder() {
    let manager = LockManager::new();

    manager.lock(b"k", LockMode::Shared).unwrap();
    manager.upgrade(b"k").unwrap();

    assert_eq!(manager.lock_state(b"k").unwrap().mode, LockMode::Exclusive);
}

#[test]
fn test_upgrade_fails_with_other_holders() {
    let manager = LockManager::new();

    manager.lock(b"k", LockMode::Shared).unwrap();
    manager.lock(b"k", LockMode::Shared).unwrap();

    assert_conflict(manager.upgrade(b"k"));
    assert_eq!(manager.lock_state(b"k").unwrap().mode, LockMode::Shared);
}

#[test]
fn test_upgrade_fails_when_unlocked_or_exclusive() {
    let manager = LockManager::new();
    assert_conflict(manager.upgrade(b"k"));

    manager.lock(b"k", LockMode::Exclusive).unwrap();
    assert_conflict(manager.upgrade(b"k"));
}

// =============================================================================
// Transaction Read/Write Tests
// =============================================================================

#[test]
fn test_read_your_writes() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);

    tx.put(&[1, 2, 3], &[11, 22, 33]).unwrap();
    assert_eq!(tx.get(&[1, 2, 3]).unwrap(), Some(vec![11, 22, 33]));
    assert_eq!(tx.get(&[4, 5, 6]).unwrap(), None);

    tx.delete(&[1, 2, 3]).unwrap();
    assert_eq!(tx.get(&[1, 2, 3]).unwrap(), None);
}

#[test]
fn test_writes_invisible_until_commit() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);

    tx.put(b"k", b"v").unwrap();
    assert_eq!(storage.lock().get(b"k").unwrap(), None);

    tx.commit().unwrap();
    assert_eq!(storage.lock().get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(tx.state(), TxState::Committed);
}

#[test]
fn test_get_takes_shared_lock() {
    let (manager, storage) = setup();
    storage.lock().put(b"k", b"v").unwrap();

    let mut tx = begin(&manager, &storage);
    assert_eq!(tx.get(b"k").unwrap(), Some(b"v".to_vec()));

    assert_eq!(manager.lock_state(b"k").unwrap().mode, LockMode::Shared);
    assert_eq!(tx.held_locks(), 1);
}

#[test]
fn test_get_for_update_takes_exclusive_lock() {
    let (manager, storage) = setup();
    storage.lock().put(b"k", b"v").unwrap();

    let mut tx = begin(&manager, &storage);
    assert_eq!(tx.get_for_update(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(manager.lock_state(b"k").unwrap().mode, LockMode::Exclusive);

    let mut other = begin(&manager, &storage);
    assert_conflict(other.get(b"k"));
}

#[test]
fn test_put_upgrades_own_shared_lock() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);

    tx.get(b"k").unwrap();
    tx.put(b"k", b"v").unwrap();

    assert_eq!(
        manager.lock_state(b"k"),
        Some(LockState {
            mode: LockMode::Exclusive,
            holders: 1
        })
    );
}

#[test]
fn test_put_fails_when_shared_with_another() {
    let (manager, storage) = setup();
    let mut reader = begin(&manager, &storage);
    let mut writer = begin(&manager, &storage);

    reader.get(b"k").unwrap();
    writer.get(b"k").unwrap();

    assert_conflict(writer.put(b"k", b"v"));
    assert_eq!(writer.state(), TxState::Aborted);

    // Writer's shared hold is gone; the reader can now upgrade
    reader.put(b"k", b"mine").unwrap();
    reader.commit().unwrap();
    assert_eq!(storage.lock().get(b"k").unwrap(), Some(b"mine".to_vec()));
}

// =============================================================================
// No-Wait Conflict Tests
// =============================================================================

#[test]
fn test_conflicting_get_aborts_immediately() {
    let (manager, storage) = setup();
    let mut t1 = begin(&manager, &storage);
    let mut t2 = begin(&manager, &storage);

    t1.put(b"X", b"1").unwrap();
    t2.put(b"other", b"2").unwrap();

    assert_conflict(t2.get(b"X"));
    assert_eq!(t2.state(), TxState::Aborted);

    // Every lock t2 held was released
    assert_eq!(manager.lock_state(b"other"), None);
    assert_eq!(t1.state(), TxState::Running);
}

#[test]
fn test_conflicting_put_aborts_immediately() {
    let (manager, storage) = setup();
    let mut t1 = begin(&manager, &storage);
    let mut t2 = begin(&manager, &storage);

    t1.put(b"X", b"1").unwrap();
    assert_conflict(t2.put(b"X", b"2"));
    assert_eq!(t2.state(), TxState::Aborted);

    t1.commit().unwrap();
    assert_eq!(storage.lock().get(b"X").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn test_aborted_writes_never_reach_storage() {
    let (manager, storage) = setup();
    let mut t1 = begin(&manager, &storage);
    let mut t2 = begin(&manager, &storage);

    t2.put(b"A", b"lost").unwrap();
    t1.put(b"B", b"1").unwrap();
    assert_conflict(t2.put(b"B", b"2"));

    assert_eq!(storage.lock().get(b"A").unwrap(), None);
}

// =============================================================================
// Increase32 Tests
// =============================================================================

#[test]
fn test_increase32_from_storage_and_absent() {
    let (manager, storage) = setup();
    storage.lock().put(b"A", &encode_i32(3)).unwrap();

    let mut tx = begin(&manager, &storage);
    tx.increase32(b"A", 4).unwrap();
    tx.increase32(b"C", 5).unwrap();
    tx.increase32(b"C", -7).unwrap();

    assert_eq!(tx.get(b"A").unwrap(), Some(encode_i32(7)));
    tx.commit().unwrap();

    let storage = storage.lock();
    assert_eq!(storage.get(b"A").unwrap(), Some(encode_i32(7)));
    assert_eq!(storage.get(b"C").unwrap(), Some(encode_i32(-2)));
}

#[test]
fn test_increase32_wraps_on_overflow() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);

    tx.put(b"n", &encode_i32(i32::MAX)).unwrap();
    tx.increase32(b"n", 1).unwrap();
    assert_eq!(tx.get(b"n").unwrap(), Some(encode_i32(i32::MIN)));
}

#[test]
fn test_increase32_rejects_malformed_value() {
    let (manager, storage) = setup();
    storage.lock().put(b"bad", b"abc").unwrap();

    let mut tx = begin(&manager, &storage);
    match tx.increase32(b"bad", 1) {
        Err(TideError::InvalidCounter { len: 3 }) => {}
        other => panic!("expected invalid counter, got {:?}", other),
    }
    assert_eq!(tx.state(), TxState::Aborted);
    assert_eq!(manager.locked_keys(), 0);
}

// =============================================================================
// Commit / Abort Tests
// =============================================================================

#[test]
fn test_commit_releases_all_locks() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);

    tx.get(b"a").unwrap();
    tx.put(b"b", b"2").unwrap();
    tx.get_for_update(b"c").unwrap();
    assert_eq!(manager.locked_keys(), 3);

    tx.commit().unwrap();
    assert_eq!(manager.locked_keys(), 0);
}

#[test]
fn test_commit_writes_only_modified_keys() {
    let (manager, storage) = setup();
    storage.lock().put(b"read", b"r").unwrap();

    let mut tx = begin(&manager, &storage);
    tx.get(b"read").unwrap();
    tx.get_for_update(b"absent").unwrap();
    tx.put(b"w", b"1").unwrap();
    tx.delete(b"read").unwrap();
    tx.commit().unwrap();

    let storage = storage.lock();
    assert_eq!(storage.get(b"w").unwrap(), Some(b"1".to_vec()));
    assert_eq!(storage.get(b"read").unwrap(), None);
    assert_eq!(storage.get(b"absent").unwrap(), None);
}

#[test]
fn test_abort_discards_and_releases() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);

    tx.put(b"k", b"v").unwrap();
    tx.abort().unwrap();

    assert_eq!(tx.state(), TxState::Aborted);
    assert_eq!(manager.locked_keys(), 0);
    assert_eq!(storage.lock().get(b"k").unwrap(), None);
}

#[test]
fn test_inactive_transaction_rejects_operations() {
    let (manager, storage) = setup();

    let mut committed = begin(&manager, &storage);
    committed.commit().unwrap();

    let mut aborted = begin(&manager, &storage);
    aborted.abort().unwrap();

    for tx in [&mut committed, &mut aborted] {
        assert_inactive(tx.get(b"k"));
        assert_inactive(tx.get_for_update(b"k"));
        assert_inactive(tx.put(b"k", b"v"));
        assert_inactive(tx.increase32(b"k", 1));
        assert_inactive(tx.delete(b"k"));
        assert_inactive(tx.commit());
        assert_inactive(tx.abort());
    }
    assert_eq!(manager.locked_keys(), 0);
}

#[test]
fn test_drop_releases_locks() {
    let (manager, storage) = setup();
    {
        let mut tx = begin(&manager, &storage);
        tx.put(b"k", b"v").unwrap();
        assert_eq!(manager.locked_keys(), 1);
    }
    assert_eq!(manager.locked_keys(), 0);
    assert_eq!(storage.lock().get(b"k").unwrap(), None);
}

#[test]
fn test_failed_commit_aborts() {
    let (manager, storage) = setup();
    let mut tx = begin(&manager, &storage);
    tx.put(b"k", b"v").unwrap();

    storage.lock().close().unwrap();

    assert!(matches!(tx.commit(), Err(TideError::StorageClosed)));
    assert_eq!(tx.state(), TxState::Aborted);
    assert_eq!(manager.locked_keys(), 0);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_increments_with_retry() {
    let (manager, storage) = setup();
    let threads = 4;
    let per_thread = 50;

    crossbeam::scope(|s| {
        for _ in 0..threads {
            let manager = Arc::clone(&manager);
            let storage = Arc::clone(&storage);
            s.spawn(move |_| {
                for _ in 0..per_thread {
                    loop {
                        let mut tx = manager.begin(Arc::clone(&storage));
                        let result = tx.increase32(b"counter", 1).and_then(|_| tx.commit());
                        match result {
                            Ok(()) => break,
                            Err(e) if e.is_conflict() => std::thread::yield_now(),
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(
        storage.lock().get(b"counter").unwrap(),
        Some(encode_i32(threads * per_thread))
    );
    assert_eq!(manager.locked_keys(), 0);
}
