pub mod log_manager;
pub mod log_record;

pub use log_manager::{LogError, LogManager};
pub use log_record::{LogPayload, LogRecord, LogRecordType, LOG_HEADER_SIZE};
