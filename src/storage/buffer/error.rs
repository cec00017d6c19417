use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Buffer pool is full: all frames are pinned")]
    BufferPoolFull,

    #[error("Disk manager error: {0}")]
    DiskManager(#[from] DiskManagerError),
}
