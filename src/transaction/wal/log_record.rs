use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::common::types::{Lsn, TxnId};
use crate::transaction::wal::log_manager::LogError;

/// Every log record starts with this fixed header:
///
/// ```text
/// [ size:4 | lsn:4 | txn_id:4 | prev_lsn:4 | record_type:4 | payload ]
/// ```
///
/// `size` counts the whole record including the header. The payload is a
/// bincode-encoded `LogPayload`; replay semantics belong to the recovery
/// collaborator, this module only defines record boundaries.
pub const LOG_HEADER_SIZE: usize = 20;

/// Types of log records emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecordType {
    Begin,
    Commit,
    Abort,
    Insert,
    MarkDelete,
    ApplyDelete,
    Update,
    NewPage,
}

impl LogRecordType {
    fn as_u32(self) -> u32 {
        match self {
            LogRecordType::Begin => 1,
            LogRecordType::Commit => 2,
            LogRecordType::Abort => 3,
            LogRecordType::Insert => 4,
            LogRecordType::MarkDelete => 5,
            LogRecordType::ApplyDelete => 6,
            LogRecordType::Update => 7,
            LogRecordType::NewPage => 8,
        }
    }

    fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => LogRecordType::Begin,
            2 => LogRecordType::Commit,
            3 => LogRecordType::Abort,
            4 => LogRecordType::Insert,
            5 => LogRecordType::MarkDelete,
            6 => LogRecordType::ApplyDelete,
            7 => LogRecordType::Update,
            8 => LogRecordType::NewPage,
            _ => return None,
        })
    }
}

/// Record body, by record family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogPayload {
    /// BEGIN/COMMIT/ABORT carry no body.
    Transaction,
    /// Tuple operations name the slot and carry before/after images.
    Data {
        page_id: u32,
        slot: u32,
        before_image: Option<Vec<u8>>,
        after_image: Option<Vec<u8>>,
    },
    /// A table heap grew a page.
    NewPage { prev_page_id: u32, page_id: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub record_type: LogRecordType,
    pub payload: LogPayload,
}

impl LogRecord {
    pub fn new(
        lsn: Lsn,
        txn_id: TxnId,
        prev_lsn: Lsn,
        record_type: LogRecordType,
        payload: LogPayload,
    ) -> Self {
        Self {
            lsn,
            txn_id,
            prev_lsn,
            record_type,
            payload,
        }
    }

    /// Serialize to the on-disk framing.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LogError> {
        let payload =
            bincode::serialize(&self.payload).map_err(|e| LogError::Serialization(e.to_string()))?;

        let mut bytes = vec![0u8; LOG_HEADER_SIZE + payload.len()];
        LittleEndian::write_u32(&mut bytes[0..4], (LOG_HEADER_SIZE + payload.len()) as u32);
        LittleEndian::write_u32(&mut bytes[4..8], self.lsn);
        LittleEndian::write_u32(&mut bytes[8..12], self.txn_id);
        LittleEndian::write_u32(&mut bytes[12..16], self.prev_lsn);
        LittleEndian::write_u32(&mut bytes[16..20], self.record_type.as_u32());
        bytes[LOG_HEADER_SIZE..].copy_from_slice(&payload);
        Ok(bytes)
    }

    /// Parse one record back from its framing.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogError> {
        if bytes.len() < LOG_HEADER_SIZE {
            return Err(LogError::InvalidFormat);
        }
        let size = LittleEndian::read_u32(&bytes[0..4]) as usize;
        if size < LOG_HEADER_SIZE || size > bytes.len() {
            return Err(LogError::InvalidFormat);
        }

        let record_type = LogRecordType::from_u32(LittleEndian::read_u32(&bytes[16..20]))
            .ok_or(LogError::InvalidFormat)?;
        let payload = bincode::deserialize(&bytes[LOG_HEADER_SIZE..size])
            .map_err(|e| LogError::Serialization(e.to_string()))?;

        Ok(Self {
            lsn: LittleEndian::read_u32(&bytes[4..8]),
            txn_id: LittleEndian::read_u32(&bytes[8..12]),
            prev_lsn: LittleEndian::read_u32(&bytes[12..16]),
            record_type,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_record_framing() {
        let record = LogRecord::new(7, 3, 5, LogRecordType::Commit, LogPayload::Transaction);
        let bytes = record.to_bytes().unwrap();

        assert_eq!(
            LittleEndian::read_u32(&bytes[0..4]) as usize,
            bytes.len()
        );
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 7);
        assert_eq!(LittleEndian::read_u32(&bytes[16..20]), 2);

        assert_eq!(LogRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn test_data_record_roundtrip() {
        let record = LogRecord::new(
            12,
            4,
            7,
            LogRecordType::Update,
            LogPayload::Data {
                page_id: 3,
                slot: 9,
                before_image: Some(vec![1, 2]),
                after_image: Some(vec![3, 4, 5]),
            },
        );
        let bytes = record.to_bytes().unwrap();
        assert_eq!(LogRecord::from_bytes(&bytes).unwrap(), record);
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let record = LogRecord::new(1, 1, 0, LogRecordType::Begin, LogPayload::Transaction);
        let bytes = record.to_bytes().unwrap();
        assert!(LogRecord::from_bytes(&bytes[..LOG_HEADER_SIZE - 1]).is_err());
    }
}
