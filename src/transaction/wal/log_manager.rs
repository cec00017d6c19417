use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::common::types::{Lsn, TxnId};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::transaction::wal::log_record::{LogPayload, LogRecord, LogRecordType};

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to serialize log record: {0}")]
    Serialization(String),

    #[error("invalid log record format")]
    InvalidFormat,

    #[error("disk manager error: {0}")]
    Disk(#[from] DiskManagerError),
}

/// Assigns LSNs and appends log records through the disk manager.
///
/// The `enable_logging` flag is a shared atomic consulted only here; the
/// storage core never inspects it. With logging disabled, appends are
/// dropped and report the invalid LSN 0.
pub struct LogManager {
    disk_manager: Arc<DiskManager>,
    next_lsn: AtomicU32,
    enable_logging: AtomicBool,
}

impl LogManager {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self {
            disk_manager,
            next_lsn: AtomicU32::new(1),
            enable_logging: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enable_logging.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_logging.load(Ordering::SeqCst)
    }

    /// Frame and append one record, returning its LSN (0 when logging is
    /// disabled).
    pub fn append_record(
        &self,
        txn_id: TxnId,
        prev_lsn: Lsn,
        record_type: LogRecordType,
        payload: LogPayload,
    ) -> Result<Lsn, LogError> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let record = LogRecord::new(lsn, txn_id, prev_lsn, record_type, payload);
        self.disk_manager.append_log(&record.to_bytes()?)?;
        Ok(lsn)
    }
}
