pub mod concurrency;
pub mod wal;

pub use concurrency::{
    IsolationLevel, LockManager, Transaction, TransactionError, TransactionManager,
    TransactionState,
};
