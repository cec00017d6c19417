use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Lsn, Rid, TxnId};
use crate::transaction::wal::LogError;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking states. GROWING until the first unlock, SHRINKING
/// afterwards; ABORTED may be set at any point by the deadlock detector
/// or the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Growing = 0,
    Shrinking = 1,
    Committed = 2,
    Aborted = 3,
}

impl TransactionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TransactionState::Growing,
            1 => TransactionState::Shrinking,
            2 => TransactionState::Committed,
            3 => TransactionState::Aborted,
            _ => unreachable!("invalid transaction state tag"),
        }
    }
}

/// Errors that abort a transaction.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("transaction {0} requested a lock while shrinking")]
    LockOnShrinking(TxnId),

    #[error("transaction {0} requested a shared lock under read-uncommitted")]
    SharedLockOnReadUncommitted(TxnId),

    #[error("transaction {0} requested an upgrade on a lock it does not hold shared")]
    UpgradeOnUnshared(TxnId),

    #[error("transaction {0} upgrade conflicts with an upgrade already in progress")]
    UpgradeConflict(TxnId),

    #[error("transaction {0} was chosen as a deadlock victim")]
    Deadlock(TxnId),

    #[error("transaction {0} is no longer active")]
    NotActive(TxnId),

    #[error("WAL error: {0}")]
    Log(#[from] LogError),
}

/// Transaction - an active unit of work under two-phase locking.
///
/// The state cell is written by two parties: the owner thread drives the
/// GROWING/SHRINKING/COMMITTED transitions and the deadlock detector may
/// flip it to ABORTED from its own thread, so it lives in an atomic.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: AtomicU8,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    prev_lsn: AtomicU32,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: AtomicU8::new(TransactionState::Growing as u8),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            prev_lsn: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        TransactionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: TransactionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn.load(Ordering::SeqCst)
    }

    pub fn set_prev_lsn(&self, lsn: Lsn) {
        self.prev_lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    /// Every RID this transaction holds a lock on, shared or exclusive.
    pub fn held_locks(&self) -> Vec<Rid> {
        let mut rids: Vec<Rid> = self.shared_lock_set.lock().iter().copied().collect();
        rids.extend(self.exclusive_lock_set.lock().iter().copied());
        rids
    }

    pub(crate) fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub(crate) fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub(crate) fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub(crate) fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }
}
