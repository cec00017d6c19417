mod deadlock;
mod lock_manager;
mod transaction;
mod transaction_manager;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{IsolationLevel, Transaction, TransactionError, TransactionState};
pub use transaction_manager::TransactionManager;
