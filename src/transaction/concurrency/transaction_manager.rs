use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::LockManager;
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionError, TransactionState,
};
use crate::transaction::wal::{LogManager, LogPayload, LogRecordType};

/// Creates and tracks transactions, writes their BEGIN/COMMIT/ABORT
/// records, and releases their locks when they finish. Rolling back data
/// modifications belongs to the recovery collaborator, not here.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    lock_manager: Arc<LockManager>,
    log_manager: Arc<LogManager>,
    active_transactions: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new(lock_manager: Arc<LockManager>, log_manager: Arc<LogManager>) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            lock_manager,
            log_manager,
            active_transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a new transaction.
    pub fn begin(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<Arc<Transaction>, TransactionError> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(Transaction::new(txn_id, isolation_level));

        let lsn =
            self.log_manager
                .append_record(txn_id, 0, LogRecordType::Begin, LogPayload::Transaction)?;
        txn.set_prev_lsn(lsn);

        self.active_transactions.lock().insert(txn_id, txn.clone());
        debug!("transaction {} began", txn_id);
        Ok(txn)
    }

    /// Commit: log, transition, release every lock.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        match txn.state() {
            TransactionState::Committed | TransactionState::Aborted => {
                return Err(TransactionError::NotActive(txn.id()))
            }
            _ => {}
        }

        let lsn = self.log_manager.append_record(
            txn.id(),
            txn.prev_lsn(),
            LogRecordType::Commit,
            LogPayload::Transaction,
        )?;
        txn.set_prev_lsn(lsn);
        txn.set_state(TransactionState::Committed);

        self.lock_manager.release_all(txn);
        self.active_transactions.lock().remove(&txn.id());
        debug!("transaction {} committed", txn.id());
        Ok(())
    }

    /// Abort: log, transition, release every lock. Also the cleanup path
    /// for deadlock victims the detector already marked aborted.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<(), TransactionError> {
        if txn.state() == TransactionState::Committed {
            return Err(TransactionError::NotActive(txn.id()));
        }

        let lsn = self.log_manager.append_record(
            txn.id(),
            txn.prev_lsn(),
            LogRecordType::Abort,
            LogPayload::Transaction,
        )?;
        txn.set_prev_lsn(lsn);
        txn.set_state(TransactionState::Aborted);

        self.lock_manager.release_all(txn);
        self.active_transactions.lock().remove(&txn.id());
        debug!("transaction {} aborted", txn.id());
        Ok(())
    }

    pub fn get_transaction(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.active_transactions.lock().get(&txn_id).cloned()
    }

    pub fn active_transaction_ids(&self) -> Vec<TxnId> {
        self.active_transactions.lock().keys().copied().collect()
    }
}
