use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use karstdb::common::types::Rid;
use karstdb::transaction::concurrency::{
    IsolationLevel, LockManager, Transaction, TransactionError, TransactionState,
};

fn make_txn(id: u32) -> Arc<Transaction> {
    Arc::new(Transaction::new(id, IsolationLevel::RepeatableRead))
}

#[test]
fn test_shared_locks_coexist() {
    let lock_manager = LockManager::default();
    let t1 = make_txn(1);
    let t2 = make_txn(2);
    let rid = Rid::new(0, 0);

    lock_manager.lock_shared(&t1, rid).unwrap();
    lock_manager.lock_shared(&t2, rid).unwrap();
    assert!(t1.is_shared_locked(rid));
    assert!(t2.is_shared_locked(rid));

    // Re-locking an already held RID is a no-op.
    lock_manager.lock_shared(&t1, rid).unwrap();

    assert!(lock_manager.unlock(&t1, rid));
    assert!(lock_manager.unlock(&t2, rid));
    assert!(!lock_manager.unlock(&t2, rid));
}

#[test]
fn test_exclusive_waits_for_all_shared_holders() {
    let lock_manager = Arc::new(LockManager::default());
    let t1 = make_txn(1);
    let t2 = make_txn(2);
    let t3 = make_txn(3);
    let rid = Rid::new(0, 1);

    lock_manager.lock_shared(&t1, rid).unwrap();
    lock_manager.lock_shared(&t2, rid).unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let writer = {
        let lock_manager = lock_manager.clone();
        let t3 = t3.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            lock_manager.lock_exclusive(&t3, rid).unwrap();
            acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    lock_manager.unlock(&t1, rid);
    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    lock_manager.unlock(&t2, rid);
    writer.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    assert!(t3.is_exclusive_locked(rid));
}

#[test]
fn test_exclusive_then_waiting_exclusive() {
    let lock_manager = Arc::new(LockManager::default());
    let t1 = make_txn(1);
    let t2 = make_txn(2);
    let rid = Rid::new(0, 2);

    lock_manager.lock_exclusive(&t1, rid).unwrap();

    let acquired = Arc::new(AtomicBool::new(false));
    let waiter = {
        let lock_manager = lock_manager.clone();
        let t2 = t2.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            lock_manager.lock_exclusive(&t2, rid).unwrap();
            acquired.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!acquired.load(Ordering::SeqCst));

    lock_manager.unlock(&t1, rid);
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
}

// T1 and T2 both hold shared; T1's upgrade waits for T2 to unlock, then
// converts in place.
#[test]
fn test_upgrade_waits_for_other_shared_holder() {
    let lock_manager = Arc::new(LockManager::default());
    let t1 = make_txn(1);
    let t2 = make_txn(2);
    let rid = Rid::new(0, 3);

    lock_manager.lock_shared(&t1, rid).unwrap();
    lock_manager.lock_shared(&t2, rid).unwrap();

    let upgraded = Arc::new(AtomicBool::new(false));
    let upgrader = {
        let lock_manager = lock_manager.clone();
        let t1 = t1.clone();
        let upgraded = upgraded.clone();
        thread::spawn(move || {
            lock_manager.lock_upgrade(&t1, rid).unwrap();
            upgraded.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!upgraded.load(Ordering::SeqCst));

    lock_manager.unlock(&t2, rid);
    upgrader.join().unwrap();

    assert!(t1.is_exclusive_locked(rid));
    assert!(!t1.is_shared_locked(rid));
}

#[test]
fn test_second_upgrade_conflicts() {
    let lock_manager = Arc::new(LockManager::default());
    let t1 = make_txn(1);
    let t2 = make_txn(2);
    let rid = Rid::new(0, 4);

    lock_manager.lock_shared(&t1, rid).unwrap();
    lock_manager.lock_shared(&t2, rid).unwrap();

    let upgrader = {
        let lock_manager = lock_manager.clone();
        let t1 = t1.clone();
        thread::spawn(move || lock_manager.lock_upgrade(&t1, rid))
    };

    // Wait until T1's upgrade is parked.
    thread::sleep(Duration::from_millis(100));

    let result = lock_manager.lock_upgrade(&t2, rid);
    assert!(matches!(result, Err(TransactionError::UpgradeConflict(2))));
    assert_eq!(t2.state(), TransactionState::Aborted);

    // The aborted transaction unwinds; T1's upgrade then grants.
    lock_manager.release_all(&t2);
    upgrader.join().unwrap().unwrap();
    assert!(t1.is_exclusive_locked(rid));
}

#[test]
fn test_upgrade_without_shared_lock() {
    let lock_manager = LockManager::default();
    let t1 = make_txn(1);
    let rid = Rid::new(0, 5);

    let result = lock_manager.lock_upgrade(&t1, rid);
    assert!(matches!(result, Err(TransactionError::UpgradeOnUnshared(1))));
    assert_eq!(t1.state(), TransactionState::Aborted);
}

#[test]
fn test_lock_after_unlock_is_rejected_under_repeatable_read() {
    let lock_manager = LockManager::default();
    let t1 = make_txn(1);
    let a = Rid::new(0, 6);
    let b = Rid::new(0, 7);

    lock_manager.lock_shared(&t1, a).unwrap();
    lock_manager.unlock(&t1, a);
    assert_eq!(t1.state(), TransactionState::Shrinking);

    let result = lock_manager.lock_shared(&t1, b);
    assert!(matches!(result, Err(TransactionError::LockOnShrinking(1))));
    assert_eq!(t1.state(), TransactionState::Aborted);
}

#[test]
fn test_read_committed_shared_unlock_keeps_growing() {
    let lock_manager = LockManager::default();
    let t1 = Arc::new(Transaction::new(1, IsolationLevel::ReadCommitted));
    let a = Rid::new(0, 8);
    let b = Rid::new(0, 9);

    lock_manager.lock_shared(&t1, a).unwrap();
    lock_manager.unlock(&t1, a);
    assert_eq!(t1.state(), TransactionState::Growing);

    // Still growing: an exclusive lock is fine, and its unlock shrinks.
    lock_manager.lock_exclusive(&t1, b).unwrap();
    lock_manager.unlock(&t1, b);
    assert_eq!(t1.state(), TransactionState::Shrinking);
}

#[test]
fn test_shared_lock_rejected_under_read_uncommitted() {
    let lock_manager = LockManager::default();
    let t1 = Arc::new(Transaction::new(1, IsolationLevel::ReadUncommitted));
    let rid = Rid::new(0, 10);

    let result = lock_manager.lock_shared(&t1, rid);
    assert!(matches!(
        result,
        Err(TransactionError::SharedLockOnReadUncommitted(1))
    ));
    assert_eq!(t1.state(), TransactionState::Aborted);
}

// T1: X(a), T2: X(b), then each requests the other's RID. The detector
// aborts the younger transaction; the older one finishes.
#[test]
fn test_deadlock_aborts_youngest() {
    let lock_manager = Arc::new(LockManager::new(Duration::from_millis(10)));
    let t1 = make_txn(1);
    let t2 = make_txn(2);
    let a = Rid::new(0, 11);
    let b = Rid::new(0, 12);

    lock_manager.lock_exclusive(&t1, a).unwrap();
    lock_manager.lock_exclusive(&t2, b).unwrap();

    let older = {
        let lock_manager = lock_manager.clone();
        let t1 = t1.clone();
        thread::spawn(move || lock_manager.lock_exclusive(&t1, b))
    };
    let younger = {
        let lock_manager = lock_manager.clone();
        let t2 = t2.clone();
        thread::spawn(move || {
            let result = lock_manager.lock_exclusive(&t2, a);
            if result.is_err() {
                // Victim cleanup: drop everything it still holds.
                lock_manager.release_all(&t2);
            }
            result
        })
    };

    let younger_result = younger.join().unwrap();
    assert!(matches!(younger_result, Err(TransactionError::Deadlock(2))));
    assert_eq!(t2.state(), TransactionState::Aborted);

    // With T2 unwound, T1's request on b grants.
    older.join().unwrap().unwrap();
    assert!(t1.is_exclusive_locked(a));
    assert!(t1.is_exclusive_locked(b));
    assert_ne!(t1.state(), TransactionState::Aborted);
}

#[test]
fn test_no_false_deadlocks_under_plain_contention() {
    let lock_manager = Arc::new(LockManager::new(Duration::from_millis(5)));
    let rid = Rid::new(0, 13);

    // Ten transactions take turns on one RID while the detector spins;
    // nobody is in a cycle, so nobody may be aborted.
    let mut handles = Vec::new();
    for id in 0..10 {
        let lock_manager = lock_manager.clone();
        handles.push(thread::spawn(move || {
            let txn = make_txn(id);
            lock_manager.lock_exclusive(&txn, rid).unwrap();
            thread::sleep(Duration::from_millis(10));
            lock_manager.unlock(&txn, rid);
            assert_ne!(txn.state(), TransactionState::Aborted);
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
