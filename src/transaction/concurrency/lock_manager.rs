use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::deadlock::{run_detection, LockTable};
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

fn compatible(a: LockMode, b: LockMode) -> bool {
    a == LockMode::Shared && b == LockMode::Shared
}

/// One transaction's position in a RID's queue. Requests carry the
/// transaction handle so the deadlock detector can abort victims
/// straight from the table.
pub(crate) struct LockRequest {
    pub(crate) txn: Arc<Transaction>,
    pub(crate) mode: LockMode,
    pub(crate) granted: bool,
}

/// Per-RID request list. Grants respect queue order; `upgrading` blocks
/// every other grant while an upgrade is parked.
pub(crate) struct LockRequestQueue {
    pub(crate) requests: VecDeque<LockRequest>,
    pub(crate) upgrading: Option<TxnId>,
    pub(crate) cv: Arc<Condvar>,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            upgrading: None,
            cv: Arc::new(Condvar::new()),
        }
    }

    /// Queue-order grantability: the request must be compatible with
    /// every granted request of another transaction, with every waiting
    /// request ahead of it (no cutting in), and no foreign upgrade may
    /// be pending.
    fn grantable(&self, txn_id: TxnId) -> bool {
        if matches!(self.upgrading, Some(upgrader) if upgrader != txn_id) {
            return false;
        }

        let mode = self
            .requests
            .iter()
            .find(|r| r.txn.id() == txn_id)
            .expect("request must be enqueued before checking grantability")
            .mode;

        let mut ahead = true;
        for request in &self.requests {
            if request.txn.id() == txn_id {
                ahead = false;
                continue;
            }
            if request.granted || ahead {
                if !compatible(request.mode, mode) {
                    return false;
                }
            }
        }
        true
    }
}

/// Row-granularity two-phase lock manager with shared/exclusive/upgrade
/// modes and background wait-for-graph deadlock detection.
///
/// One mutex covers the whole lock table; waiters park on their queue's
/// condition variable with the predicate "grantable or aborted". The
/// detector wakes on a fixed interval, aborts the youngest transaction
/// of each cycle and pokes the condvar that victim is parked on.
pub struct LockManager {
    table: Arc<LockTable>,
    running: Arc<AtomicBool>,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl LockManager {
    pub fn new(detection_interval: Duration) -> Self {
        let table: Arc<LockTable> = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let detector = {
            let table = table.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("deadlock-detector".into())
                .spawn(move || run_detection(table, running, detection_interval))
                .expect("failed to spawn the deadlock detector")
        };

        Self {
            table,
            running,
            detector: Mutex::new(Some(detector)),
        }
    }

    /// Acquire a shared lock, blocking until granted. Fails immediately
    /// under read-uncommitted, or while shrinking under repeatable-read.
    pub fn lock_shared(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut guard = self.table.lock();

        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::SharedLockOnReadUncommitted(txn.id()));
        }
        if txn.state() == TransactionState::Shrinking
            && txn.isolation_level() == IsolationLevel::RepeatableRead
        {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::LockOnShrinking(txn.id()));
        }
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            return Ok(());
        }

        let queue = guard.entry(rid).or_insert_with(LockRequestQueue::new);
        queue.requests.push_back(LockRequest {
            txn: txn.clone(),
            mode: LockMode::Shared,
            granted: false,
        });

        self.wait_until_granted(&mut guard, txn, rid)?;
        txn.add_shared_lock(rid);
        Ok(())
    }

    /// Acquire an exclusive lock, blocking until granted.
    pub fn lock_exclusive(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut guard = self.table.lock();

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::LockOnShrinking(txn.id()));
        }
        if txn.is_exclusive_locked(rid) {
            return Ok(());
        }

        let queue = guard.entry(rid).or_insert_with(LockRequestQueue::new);
        queue.requests.push_back(LockRequest {
            txn: txn.clone(),
            mode: LockMode::Exclusive,
            granted: false,
        });

        self.wait_until_granted(&mut guard, txn, rid)?;
        txn.add_exclusive_lock(rid);
        Ok(())
    }

    /// Upgrade a held shared lock to exclusive. The upgrading request
    /// keeps its queue position, so it outranks ordinary waiters; only
    /// one upgrade may be pending per RID.
    pub fn lock_upgrade(&self, txn: &Arc<Transaction>, rid: Rid) -> Result<(), TransactionError> {
        let mut guard = self.table.lock();

        if txn.state() == TransactionState::Shrinking {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::LockOnShrinking(txn.id()));
        }
        if txn.is_exclusive_locked(rid) {
            return Ok(());
        }
        if !txn.is_shared_locked(rid) {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::UpgradeOnUnshared(txn.id()));
        }

        let queue = guard
            .get_mut(&rid)
            .expect("a shared holder has a request queue");
        if queue.upgrading.is_some() {
            txn.set_state(TransactionState::Aborted);
            return Err(TransactionError::UpgradeConflict(txn.id()));
        }
        queue.upgrading = Some(txn.id());

        let request = queue
            .requests
            .iter_mut()
            .find(|r| r.txn.id() == txn.id())
            .expect("a shared holder has a granted request");
        request.granted = false;
        request.mode = LockMode::Exclusive;

        self.wait_until_granted(&mut guard, txn, rid)?;

        let queue = guard
            .get_mut(&rid)
            .expect("the upgraded queue still exists");
        queue.upgrading = None;
        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        Ok(())
    }

    /// Release a held lock. Returns false when the transaction holds no
    /// lock on the RID. Drives the 2PL transition: the first unlock
    /// moves a growing transaction to shrinking, except a shared unlock
    /// under read-committed.
    pub fn unlock(&self, txn: &Arc<Transaction>, rid: Rid) -> bool {
        let mut guard = self.table.lock();

        let held_shared = txn.is_shared_locked(rid);
        let held_exclusive = txn.is_exclusive_locked(rid);
        if !held_shared && !held_exclusive {
            return false;
        }

        if let Some(queue) = guard.get_mut(&rid) {
            queue.requests.retain(|r| r.txn.id() != txn.id());
            queue.cv.notify_all();
            if queue.requests.is_empty() && queue.upgrading.is_none() {
                guard.remove(&rid);
            }
        }

        let shared_unlock_under_read_committed =
            held_shared && txn.isolation_level() == IsolationLevel::ReadCommitted;
        if !shared_unlock_under_read_committed && txn.state() == TransactionState::Growing {
            txn.set_state(TransactionState::Shrinking);
        }

        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);
        true
    }

    /// Release everything the transaction still holds. Commit and abort
    /// paths end with this.
    pub fn release_all(&self, txn: &Arc<Transaction>) {
        for rid in txn.held_locks() {
            self.unlock(txn, rid);
        }
    }

    /// Park until the request is grantable or the transaction is aborted
    /// by the detector. On abort the request is swept out of the queue
    /// and the caller gets the deadlock error.
    fn wait_until_granted(
        &self,
        guard: &mut MutexGuard<'_, HashMap<Rid, LockRequestQueue>>,
        txn: &Arc<Transaction>,
        rid: Rid,
    ) -> Result<(), TransactionError> {
        loop {
            if txn.state() == TransactionState::Aborted {
                if let Some(queue) = guard.get_mut(&rid) {
                    queue.requests.retain(|r| r.txn.id() != txn.id());
                    if queue.upgrading == Some(txn.id()) {
                        queue.upgrading = None;
                    }
                    queue.cv.notify_all();
                    if queue.requests.is_empty() && queue.upgrading.is_none() {
                        guard.remove(&rid);
                    }
                }
                return Err(TransactionError::Deadlock(txn.id()));
            }

            let queue = guard
                .get_mut(&rid)
                .expect("queue must exist while a request waits");
            if queue.grantable(txn.id()) {
                let request = queue
                    .requests
                    .iter_mut()
                    .find(|r| r.txn.id() == txn.id())
                    .expect("waiting request is enqueued");
                request.granted = true;
                return Ok(());
            }

            let cv = queue.cv.clone();
            cv.wait(guard);
        }
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.detector.lock().take() {
            let _ = handle.join();
        }
    }
}
